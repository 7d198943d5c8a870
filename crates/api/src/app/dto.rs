use serde::{Deserialize, Serialize};
use uuid::Uuid;

use billseq_events::OrderPlaced;
use billseq_invoicing::Invoice;

// -------------------------
// Request DTOs
// -------------------------

/// Order-placed notification body.
#[derive(Debug, Deserialize)]
pub struct OrderPlacedHook {
    pub id: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct InvoiceDto {
    pub id: String,
    pub invoice_number: Option<u64>,
    pub order_id: String,
    pub status: &'static str,
}

impl From<&Invoice> for InvoiceDto {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id().to_string(),
            invoice_number: invoice.invoice_number().map(|n| n.get()),
            order_id: invoice.order_id().to_string(),
            status: invoice.status().as_str(),
        }
    }
}

/// `invoice` is `null` when the order has no live invoice.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice: Option<InvoiceDto>,
}

#[derive(Debug, Serialize)]
pub struct HookAccepted {
    pub event_id: Uuid,
    pub order_id: String,
}

impl From<&OrderPlaced> for HookAccepted {
    fn from(event: &OrderPlaced) -> Self {
        Self {
            event_id: event.event_id,
            order_id: event.order_id.to_string(),
        }
    }
}

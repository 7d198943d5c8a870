use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
};
use tracing::error;

use billseq_core::OrderId;

use crate::app::dto::{InvoiceDto, InvoiceResponse};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

/// `GET /store/orders/:id/invoice`
///
/// The id must look like `order_<26 alphanumerics>`; nothing touches the
/// store otherwise. A missing invoice is a `200` with `invoice: null`.
pub async fn get_order_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let order_id: OrderId = id.parse().map_err(|_| ApiError::InvalidOrderId)?;

    let invoice = services
        .invoices
        .get_invoice_by_order_id(&order_id)
        .await
        .map_err(|err| {
            error!(order_id = %order_id, error = %err, "failed to retrieve invoice");
            ApiError::InvoiceLookup
        })?;

    Ok(Json(InvoiceResponse {
        invoice: invoice.as_ref().map(InvoiceDto::from),
    }))
}

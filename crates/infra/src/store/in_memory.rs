use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use billseq_core::InvoiceId;
use billseq_invoicing::{Invoice, InvoiceStatus};

use super::{
    InvoiceFilter, InvoiceOrder, InvoiceStore, InvoiceUpdate, NewInvoice, StoreError, StoreResult,
};

/// In-memory invoice store.
///
/// Intended for tests/dev. Enforces the same uniqueness and guarded-update
/// rules as the Postgres store, under a single write lock.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceStore {
    rows: RwLock<HashMap<InvoiceId, Invoice>>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Storage("lock poisoned".to_string())
    }
}

fn sort_rows(rows: &mut [Invoice], order: InvoiceOrder) {
    match order {
        InvoiceOrder::CreatedAsc => rows.sort_by_key(|i| (i.created_at(), i.id())),
        // `None` sorts below `Some`, so reversing puts unnumbered rows last.
        InvoiceOrder::NumberDesc => {
            rows.sort_by(|a, b| b.invoice_number().cmp(&a.invoice_number()))
        }
    }
}

#[async_trait::async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn list(
        &self,
        filter: InvoiceFilter,
        order: Option<InvoiceOrder>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Invoice>> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;

        let mut matched: Vec<Invoice> = rows.values().filter(|i| filter.matches(i)).cloned().collect();
        sort_rows(&mut matched, order.unwrap_or_default());
        if let Some(limit) = limit {
            matched.truncate(limit);
        }

        Ok(matched)
    }

    async fn create(&self, new: NewInvoice) -> StoreResult<Invoice> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;

        if rows
            .values()
            .any(|i| !i.is_deleted() && i.order_id() == &new.order_id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "invoice for order {} already exists",
                new.order_id
            )));
        }

        let invoice = Invoice::pending(InvoiceId::new(), new.order_id, Utc::now());
        rows.insert(invoice.id(), invoice.clone());
        Ok(invoice)
    }

    async fn update(&self, updates: Vec<InvoiceUpdate>) -> StoreResult<Vec<Invoice>> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;

        // Validate the whole batch before touching anything.
        for (idx, u) in updates.iter().enumerate() {
            let current = rows
                .get(&u.id)
                .filter(|i| !i.is_deleted())
                .ok_or_else(|| StoreError::NotFound(u.id.to_string()))?;

            // A repeated id in one batch finds its row already finalized.
            let repeated = updates[..idx].iter().any(|prev| prev.id == u.id);
            if repeated || current.status() != InvoiceStatus::Pending {
                return Err(StoreError::StaleWrite(format!(
                    "invoice {} is no longer pending",
                    u.id
                )));
            }

            let taken_by_row = rows
                .values()
                .any(|i| !i.is_deleted() && i.invoice_number() == Some(u.invoice_number));
            let taken_in_batch = updates[..idx]
                .iter()
                .any(|prev| prev.invoice_number == u.invoice_number);
            if taken_by_row || taken_in_batch {
                return Err(StoreError::UniqueViolation(format!(
                    "invoice number {} already assigned",
                    u.invoice_number
                )));
            }
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(updates.len());
        for u in updates {
            let row = rows
                .get_mut(&u.id)
                .ok_or_else(|| StoreError::NotFound(u.id.to_string()))?;
            row.finalize(u.invoice_number, now)
                .map_err(|e| StoreError::StaleWrite(e.to_string()))?;
            updated.push(row.clone());
        }

        Ok(updated)
    }

    async fn retrieve(&self, id: InvoiceId) -> StoreResult<Invoice> {
        let rows = self.rows.read().map_err(|_| Self::poisoned())?;

        rows.get(&id)
            .filter(|i| !i.is_deleted())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, ids: &[InvoiceId]) -> StoreResult<()> {
        let mut rows = self.rows.write().map_err(|_| Self::poisoned())?;

        let now = Utc::now();
        for id in ids {
            if let Some(row) = rows.get_mut(id) {
                row.soft_delete(now);
            }
        }
        Ok(())
    }
}

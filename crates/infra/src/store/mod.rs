//! Invoice record store boundary.
//!
//! The store is the only serialization point for invoice numbering: there is
//! no sequence generator and no in-process lock. Implementations must enforce,
//! atomically at commit:
//!
//! - at most one non-deleted invoice per `order_id`
//! - at most one non-deleted invoice per `invoice_number`
//! - finalizing only rows that are still `pending`
//!
//! Violations surface as [`StoreError::UniqueViolation`] or
//! [`StoreError::StaleWrite`], which callers treat as retryable conflicts.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use thiserror::Error;

use billseq_core::{InvoiceId, OrderId};
use billseq_invoicing::{Invoice, InvoiceNumber, InvoiceStatus};

pub use in_memory::InMemoryInvoiceStore;
pub use postgres::PostgresInvoiceStore;

/// Store operation error.
///
/// These are **infrastructure errors**; domain rule violations stay in
/// `DomainError`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("invoice not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint rejected the write (order or number taken).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A guarded update matched no row because another writer got there first.
    #[error("stale write: {0}")]
    StaleWrite(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl StoreError {
    /// Lost a race with a concurrent writer; recomputing and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_) | StoreError::StaleWrite(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row filter for [`InvoiceStore::list`]. Empty matches every live invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvoiceFilter {
    pub id: Option<InvoiceId>,
    pub order_id: Option<OrderId>,
    pub status: Option<InvoiceStatus>,
    pub include_deleted: bool,
}

impl InvoiceFilter {
    pub fn by_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Default::default()
        }
    }

    pub fn by_status(status: InvoiceStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.id.is_none_or(|id| invoice.id() == id)
            && self.order_id.as_ref().is_none_or(|o| invoice.order_id() == o)
            && self.status.is_none_or(|s| invoice.status() == s)
            && (self.include_deleted || !invoice.is_deleted())
    }
}

/// Result ordering for [`InvoiceStore::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvoiceOrder {
    /// Oldest first (insertion order).
    #[default]
    CreatedAsc,
    /// Highest invoice number first; unnumbered rows last.
    NumberDesc,
}

/// Insert payload. New invoices always start `pending` without a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub order_id: OrderId,
}

/// Finalize a pending invoice: set its number and mark it `created`.
///
/// Applied only if the row is still pending; otherwise the write is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceUpdate {
    pub id: InvoiceId,
    pub invoice_number: InvoiceNumber,
}

impl InvoiceUpdate {
    pub fn finalize(id: InvoiceId, invoice_number: InvoiceNumber) -> Self {
        Self { id, invoice_number }
    }
}

/// Invoice persistence.
///
/// Soft-deleted rows are invisible to `retrieve` and to every uniqueness
/// check, and only visible to `list` with `include_deleted`.
#[async_trait::async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn list(
        &self,
        filter: InvoiceFilter,
        order: Option<InvoiceOrder>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Invoice>>;

    async fn create(&self, new: NewInvoice) -> StoreResult<Invoice>;

    /// Apply every update or none. Returns the updated rows in input order.
    async fn update(&self, updates: Vec<InvoiceUpdate>) -> StoreResult<Vec<Invoice>>;

    async fn retrieve(&self, id: InvoiceId) -> StoreResult<Invoice>;

    /// Soft delete. Unknown or already-deleted ids are ignored.
    async fn delete(&self, ids: &[InvoiceId]) -> StoreResult<()>;
}

#[async_trait::async_trait]
impl<S> InvoiceStore for Arc<S>
where
    S: InvoiceStore + ?Sized,
{
    async fn list(
        &self,
        filter: InvoiceFilter,
        order: Option<InvoiceOrder>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Invoice>> {
        (**self).list(filter, order, limit).await
    }

    async fn create(&self, new: NewInvoice) -> StoreResult<Invoice> {
        (**self).create(new).await
    }

    async fn update(&self, updates: Vec<InvoiceUpdate>) -> StoreResult<Vec<Invoice>> {
        (**self).update(updates).await
    }

    async fn retrieve(&self, id: InvoiceId) -> StoreResult<Invoice> {
        (**self).retrieve(id).await
    }

    async fn delete(&self, ids: &[InvoiceId]) -> StoreResult<()> {
        (**self).delete(ids).await
    }
}

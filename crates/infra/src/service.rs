//! Invoice service: pending bootstrap and gapless number assignment.
//!
//! Numbering uses optimistic concurrency. The candidate is `max + 1` over
//! created invoices; the store's unique index on `invoice_number` decides who
//! wins when two assigners pick the same candidate. Losers wait a little,
//! recompute and try again, a bounded number of times.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, instrument};

use billseq_core::{DomainError, InvoiceId, OrderId};
use billseq_invoicing::{Invoice, InvoiceNumber, InvoiceStatus};

use crate::store::{
    InvoiceFilter, InvoiceOrder, InvoiceStore, InvoiceUpdate, NewInvoice, StoreError,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvoiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Failure forced by the failure injector.
    #[error("simulated invoice failure")]
    Simulated,
}

impl InvoiceError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, InvoiceError::Store(e) if e.is_conflict())
    }

    /// Retrying cannot help: the invoice is gone or a domain rule rejects it.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            InvoiceError::Store(StoreError::NotFound(_)) | InvoiceError::Domain(_)
        )
    }
}

/// Local retry budget for lost numbering races.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetry {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Wait before retry `n` is `step * n`.
    pub step: Duration,
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self {
            max_retries: 5,
            step: Duration::from_millis(100),
        }
    }
}

impl ConflictRetry {
    pub fn delay(&self, retry: u32) -> Duration {
        self.step.saturating_mul(retry)
    }
}

#[derive(Debug)]
pub struct InvoiceService<S> {
    store: S,
    conflict_retry: ConflictRetry,
}

impl<S: InvoiceStore> InvoiceService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            conflict_retry: ConflictRetry::default(),
        }
    }

    pub fn with_conflict_retry(mut self, conflict_retry: ConflictRetry) -> Self {
        self.conflict_retry = conflict_retry;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The live invoice for `order_id`, if any.
    pub async fn get_invoice_by_order_id(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Invoice>, InvoiceError> {
        let mut found = self
            .store
            .list(InvoiceFilter::by_order(order_id.clone()), None, Some(1))
            .await?;
        Ok(found.pop())
    }

    /// Return the invoice for `order_id`, creating a pending one if needed.
    ///
    /// Safe to call repeatedly and concurrently: a lost create race re-reads
    /// and returns the winner's record.
    #[instrument(skip_all, fields(order_id = %order_id))]
    pub async fn ensure_pending(&self, order_id: &OrderId) -> Result<Invoice, InvoiceError> {
        if let Some(existing) = self.get_invoice_by_order_id(order_id).await? {
            info!(invoice_id = %existing.id(), "invoice already exists for order");
            return Ok(existing);
        }

        match self
            .store
            .create(NewInvoice {
                order_id: order_id.clone(),
            })
            .await
        {
            Ok(invoice) => {
                info!(invoice_id = %invoice.id(), "pending invoice created");
                Ok(invoice)
            }
            Err(err @ StoreError::UniqueViolation(_)) => {
                match self.get_invoice_by_order_id(order_id).await? {
                    Some(winner) => {
                        info!(invoice_id = %winner.id(), "concurrent bootstrap, using existing invoice");
                        Ok(winner)
                    }
                    None => Err(err.into()),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `max(invoice_number over created invoices) + 1`, or 1 if none.
    pub async fn next_invoice_number(&self) -> Result<InvoiceNumber, InvoiceError> {
        let top = self
            .store
            .list(
                InvoiceFilter::by_status(InvoiceStatus::Created),
                Some(InvoiceOrder::NumberDesc),
                Some(1),
            )
            .await?;

        Ok(InvoiceNumber::following(
            top.first().and_then(Invoice::invoice_number),
        ))
    }

    /// Give `invoice_id` the next number in the sequence.
    ///
    /// Idempotent: an already numbered invoice is returned without a write.
    /// Conflicts are retried locally up to `ConflictRetry::max_retries`
    /// times, then returned; other errors are returned at once.
    #[instrument(skip_all, fields(invoice_id = %invoice_id))]
    pub async fn assign_invoice_number(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, InvoiceError> {
        let mut retry: u32 = 0;

        loop {
            let invoice = self.store.retrieve(invoice_id).await?;
            if let Some(number) = invoice.invoice_number().filter(|_| invoice.is_finalized()) {
                info!(invoice_number = %number, "invoice already has number assigned");
                return Ok(invoice);
            }

            match self.try_assign(invoice_id).await {
                Ok(updated) => return Ok(updated),
                Err(err) if err.is_conflict() && retry < self.conflict_retry.max_retries => {
                    retry += 1;
                    info!(retry, error = %err, "concurrent conflict, retrying");
                    tokio::time::sleep(self.conflict_retry.delay(retry)).await;
                }
                Err(err) => {
                    error!(error = %err, "failed to assign invoice number");
                    return Err(err);
                }
            }
        }
    }

    async fn try_assign(&self, invoice_id: InvoiceId) -> Result<Invoice, InvoiceError> {
        let candidate = self.next_invoice_number().await?;

        let updated = self
            .store
            .update(vec![InvoiceUpdate::finalize(invoice_id, candidate)])
            .await?;

        updated
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(invoice_id.to_string()).into())
    }

    /// All live invoices still waiting for a number, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<Invoice>, InvoiceError> {
        Ok(self
            .store
            .list(InvoiceFilter::by_status(InvoiceStatus::Pending), None, None)
            .await?)
    }

    pub async fn delete_invoices(&self, ids: &[InvoiceId]) -> Result<(), InvoiceError> {
        Ok(self.store.delete(ids).await?)
    }
}

//! "Order placed" -> numbered invoice.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use billseq_events::OrderPlaced;
use billseq_invoicing::{BackoffPolicy, FailureInjector, Invoice};

use crate::config::InvoiceConfig;
use crate::retry::{RetryOptions, retry_with_backoff};
use crate::service::{InvoiceError, InvoiceService};
use crate::store::InvoiceStore;

/// Bootstraps a pending invoice for the order, then numbers it through the
/// retry engine.
///
/// With no attempt cap (the default) a transient failure is retried until it
/// succeeds; the sweep only sees invoices whose handler never finished.
#[derive(Debug)]
pub struct OrderPlacedHandler<S> {
    service: Arc<InvoiceService<S>>,
    backoff: BackoffPolicy,
    injector: FailureInjector,
    max_attempts: Option<u32>,
}

impl<S> Clone for OrderPlacedHandler<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            backoff: self.backoff,
            injector: self.injector,
            max_attempts: self.max_attempts,
        }
    }
}

impl<S: InvoiceStore> OrderPlacedHandler<S> {
    pub fn new(service: Arc<InvoiceService<S>>, config: &InvoiceConfig) -> Self {
        Self {
            service,
            backoff: config.backoff(),
            injector: config.failure_injector(),
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[instrument(skip_all, fields(order_id = %event.order_id, event_id = %event.event_id))]
    pub async fn handle(&self, event: &OrderPlaced) -> Result<Invoice, InvoiceError> {
        let order_id = &event.order_id;
        info!("order placed, attempting to create invoice");

        let pending = self.service.ensure_pending(order_id).await?;
        let invoice_id = pending.id();
        let backoff = self.backoff;

        let mut options = RetryOptions::new()
            .should_abort(InvoiceError::is_permanent)
            .on_attempt_fail(move |attempt, err: &InvoiceError| {
                warn!(
                    attempt,
                    error = %err,
                    retry_in_ms = backoff.delay(attempt).as_millis() as u64,
                    "invoice attempt failed, retrying"
                );
            });
        if let Some(max) = self.max_attempts {
            options = options.max_attempts(max);
        }

        let invoice = retry_with_backoff(self.backoff, options, || {
            let service = Arc::clone(&self.service);
            let injector = self.injector;
            async move {
                if injector.should_fail() {
                    return Err(InvoiceError::Simulated);
                }
                service.assign_invoice_number(invoice_id).await
            }
        })
        .await?;

        if let Some(number) = invoice.invoice_number() {
            info!(invoice_number = %number, "invoice created for order");
        }
        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryInvoiceStore;
    use billseq_core::OrderId;
    use billseq_invoicing::{InvoiceNumber, InvoiceStatus};

    fn config(injector: FailureInjector) -> InvoiceConfig {
        InvoiceConfig {
            failure_rate: injector.rate(),
            simulate_failures: injector.is_enabled(),
            ..InvoiceConfig::default()
        }
    }

    fn placed(id: &str) -> OrderPlaced {
        OrderPlaced::new(OrderId::new(id).unwrap())
    }

    #[tokio::test]
    async fn numbers_the_order_without_injection() {
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        let handler = OrderPlacedHandler::new(service.clone(), &config(FailureInjector::disabled()));

        let invoice = handler.handle(&placed("order_a")).await.unwrap();

        assert_eq!(invoice.invoice_number(), Some(InvoiceNumber::first()));
        assert_eq!(invoice.status(), InvoiceStatus::Created);
    }

    #[tokio::test]
    async fn redelivered_event_keeps_the_same_number() {
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        let handler = OrderPlacedHandler::new(service.clone(), &config(FailureInjector::disabled()));
        let event = placed("order_a");

        let first = handler.handle(&event).await.unwrap();
        let again = handler.handle(&event).await.unwrap();

        assert_eq!(first.id(), again.id());
        assert_eq!(first.invoice_number(), again.invoice_number());
    }

    #[tokio::test(start_paused = true)]
    async fn capped_handler_leaves_invoice_pending_when_every_attempt_fails() {
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        let always_fail = FailureInjector::new(1.0, true).unwrap();
        let handler = OrderPlacedHandler::new(service.clone(), &config(always_fail)).with_max_attempts(3);

        let err = handler.handle(&placed("order_a")).await.unwrap_err();

        assert_eq!(err, InvoiceError::Simulated);
        let pending = service.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id().as_str(), "order_a");
    }
}

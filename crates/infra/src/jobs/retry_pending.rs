use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use billseq_core::InvoiceId;
use billseq_invoicing::{FailureInjector, Invoice};

use crate::config::InvoiceConfig;
use crate::service::{InvoiceError, InvoiceService};
use crate::store::InvoiceStore;
use crate::workers::WorkerHandle;

/// Split `items` into consecutive groups of `size` (the last may be shorter).
///
/// A `size` of zero is treated as one.
pub fn chunk<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// Outcome counts for one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub found: usize,
    pub assigned: usize,
    pub failed: usize,
}

/// Reconciliation sweep for invoices stuck in `pending`.
///
/// - Schedule: runs on startup, then every `interval`
/// - Groups of `batch_size` run one after another; members run concurrently
/// - Failures (including panics) are logged and left for the next run
#[derive(Debug)]
pub struct RetryPendingInvoices<S> {
    service: Arc<InvoiceService<S>>,
    injector: FailureInjector,
    batch_size: usize,
    interval: Duration,
}

impl<S> RetryPendingInvoices<S>
where
    S: InvoiceStore + 'static,
{
    pub fn new(service: Arc<InvoiceService<S>>, config: &InvoiceConfig) -> Self {
        Self {
            service,
            injector: config.failure_injector(),
            batch_size: config.sweep_batch_size.max(1),
            interval: config.retry_interval,
        }
    }

    /// Run one sweep. Never fails; problems are logged and counted.
    pub async fn run_once(&self) -> SweepReport {
        info!("checking for pending invoices");

        let pending = match self.service.list_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                error!(error = %err, "error in retry job");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            found: pending.len(),
            ..SweepReport::default()
        };
        if pending.is_empty() {
            info!("no pending invoices found");
            return report;
        }
        info!(count = pending.len(), "found pending invoices");

        for group in chunk(&pending, self.batch_size) {
            let handles: Vec<_> = group
                .iter()
                .map(|invoice| {
                    let service = Arc::clone(&self.service);
                    let injector = self.injector;
                    let invoice_id = invoice.id();
                    tokio::spawn(process_invoice(service, injector, invoice_id))
                })
                .collect();

            let outcomes = join_all(handles).await;

            for (invoice, outcome) in group.iter().zip(outcomes) {
                match outcome {
                    Ok(Ok(updated)) => {
                        report.assigned += 1;
                        if let Some(number) = updated.invoice_number() {
                            info!(
                                order_id = %invoice.order_id(),
                                invoice_number = %number,
                                "invoice created for order"
                            );
                        }
                    }
                    Ok(Err(err)) => {
                        report.failed += 1;
                        warn!(
                            order_id = %invoice.order_id(),
                            error = %err,
                            "failed to create invoice, will retry in next run"
                        );
                    }
                    Err(join_err) => {
                        report.failed += 1;
                        error!(
                            order_id = %invoice.order_id(),
                            error = %join_err,
                            "invoice task aborted, will retry in next run"
                        );
                    }
                }
            }
        }

        info!(
            found = report.found,
            assigned = report.assigned,
            failed = report.failed,
            "pending invoice sweep finished"
        );
        report
    }

    /// Run the sweep on its schedule until the handle is shut down.
    pub fn spawn(self, name: &'static str) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let join = tokio::spawn(async move {
            info!(job = name, interval_secs = self.interval.as_secs(), "retry job started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }

            info!(job = name, "retry job stopped");
        });

        WorkerHandle::new(name, shutdown_tx, join)
    }
}

async fn process_invoice<S>(
    service: Arc<InvoiceService<S>>,
    injector: FailureInjector,
    invoice_id: InvoiceId,
) -> Result<Invoice, InvoiceError>
where
    S: InvoiceStore,
{
    if injector.should_fail() {
        return Err(InvoiceError::Simulated);
    }
    service.assign_invoice_number(invoice_id).await
}

//! Chaos simulation: many orders numbered concurrently under injected failures.
//!
//! Each synthetic order goes through the same path as a real one (bootstrap,
//! then assignment through the retry engine) with a bounded attempt budget, so
//! the run always terminates. The summary reports whether the numbers that
//! were handed out form a gapless range.

use std::sync::Arc;

use futures::future::join_all;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::Serialize;
use tracing::{info, warn};

use billseq_core::id::{ORDER_ID_BODY_LEN, ORDER_ID_PREFIX};
use billseq_core::{DomainResult, InvoiceId, OrderId};
use billseq_invoicing::{BackoffPolicy, FailureInjector, InvoiceNumber};

use crate::config::InvoiceConfig;
use crate::retry::{RetryOptions, retry_with_backoff};
use crate::service::{InvoiceError, InvoiceService};
use crate::store::InvoiceStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub orders: usize,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub injector: FailureInjector,
    /// Soft-delete the synthetic invoices once the summary is built.
    pub cleanup: bool,
}

impl SimulationConfig {
    pub fn from_invoice_config(config: &InvoiceConfig) -> Self {
        Self {
            orders: 10,
            max_attempts: 10,
            backoff: config.backoff(),
            injector: config.failure_injector(),
            cleanup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderOutcome {
    pub order_id: OrderId,
    pub invoice_id: Option<InvoiceId>,
    pub invoice_number: Option<InvoiceNumber>,
    pub attempts: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationSummary {
    pub outcomes: Vec<OrderOutcome>,
}

impl SimulationSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn successful(&self) -> usize {
        self.outcomes.iter().filter(|o| o.invoice_number.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.successful()
    }

    pub fn total_attempts(&self) -> u32 {
        self.outcomes.iter().map(|o| o.attempts).sum()
    }

    pub fn average_attempts(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        f64::from(self.total_attempts()) / self.total() as f64
    }

    /// Numbers handed out during the run, ascending.
    pub fn assigned_numbers(&self) -> Vec<InvoiceNumber> {
        let mut numbers: Vec<_> = self.outcomes.iter().filter_map(|o| o.invoice_number).collect();
        numbers.sort_unstable();
        numbers
    }

    /// Whether the assigned numbers cover `min..=max` with no holes or repeats.
    ///
    /// On a store that already held invoices this is the strongest check
    /// available; see [`is_gapless`](Self::is_gapless) for a fresh store.
    pub fn is_contiguous(&self) -> bool {
        let numbers = self.assigned_numbers();
        match (numbers.first(), numbers.last()) {
            (Some(min), Some(max)) => {
                let span = max.get() - min.get() + 1;
                numbers.windows(2).all(|w| w[0] != w[1]) && span == numbers.len() as u64
            }
            _ => true,
        }
    }

    /// Contiguous and starting at 1: exactly `{1..=n}` for `n` successes.
    pub fn is_gapless(&self) -> bool {
        self.is_contiguous()
            && self
                .assigned_numbers()
                .first()
                .is_none_or(|min| *min == InvoiceNumber::first())
    }
}

/// A random id in the public `order_<26 alphanumerics>` shape.
pub fn synthetic_order_id<R: Rng + ?Sized>(rng: &mut R) -> DomainResult<OrderId> {
    let body: String = (0..ORDER_ID_BODY_LEN)
        .map(|_| char::from(rng.sample(Alphanumeric)))
        .collect();
    format!("{ORDER_ID_PREFIX}{body}").parse()
}

pub async fn run_simulation<S>(
    service: Arc<InvoiceService<S>>,
    config: SimulationConfig,
) -> SimulationSummary
where
    S: InvoiceStore + 'static,
{
    info!(
        orders = config.orders,
        failure_rate = config.injector.rate(),
        failures_enabled = config.injector.is_enabled(),
        "starting invoice simulation"
    );

    let order_ids: Vec<OrderId> = {
        let mut rng = rand::thread_rng();
        (0..config.orders)
            .filter_map(|_| match synthetic_order_id(&mut rng) {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(error = %err, "skipping malformed synthetic order id");
                    None
                }
            })
            .collect()
    };

    let handles: Vec<_> = order_ids
        .into_iter()
        .enumerate()
        .map(|(idx, order_id)| {
            let service = Arc::clone(&service);
            tokio::spawn(simulate_order(service, config, idx + 1, order_id))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for joined in join_all(handles).await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => warn!(error = %err, "simulated order task aborted"),
        }
    }

    let summary = SimulationSummary { outcomes };
    info!(
        total = summary.total(),
        successful = summary.successful(),
        failed = summary.failed(),
        total_attempts = summary.total_attempts(),
        average_attempts = summary.average_attempts(),
        contiguous = summary.is_contiguous(),
        gapless = summary.is_gapless(),
        "simulation finished"
    );

    if config.cleanup {
        cleanup(&service, &summary).await;
    }

    summary
}

async fn simulate_order<S>(
    service: Arc<InvoiceService<S>>,
    config: SimulationConfig,
    seq: usize,
    order_id: OrderId,
) -> OrderOutcome
where
    S: InvoiceStore,
{
    info!(order = seq, order_id = %order_id, "starting");

    let mut outcome = OrderOutcome {
        order_id: order_id.clone(),
        invoice_id: None,
        invoice_number: None,
        attempts: 0,
        error: None,
    };

    let pending = match service.ensure_pending(&order_id).await {
        Ok(pending) => pending,
        Err(err) => {
            warn!(order = seq, error = %err, "bootstrap failed");
            outcome.error = Some(err.to_string());
            return outcome;
        }
    };
    let invoice_id = pending.id();
    outcome.invoice_id = Some(invoice_id);

    let backoff = config.backoff;
    let options = RetryOptions::new()
        .max_attempts(config.max_attempts)
        .on_attempt_fail(move |attempt, err: &InvoiceError| {
            info!(
                order = seq,
                attempt,
                error = %err,
                retry_in_ms = backoff.delay(attempt).as_millis() as u64,
                "attempt failed"
            );
        });

    let mut attempts = 0u32;
    let result = retry_with_backoff(config.backoff, options, || {
        attempts += 1;
        let service = Arc::clone(&service);
        let injector = config.injector;
        async move {
            if injector.should_fail() {
                return Err(InvoiceError::Simulated);
            }
            service.assign_invoice_number(invoice_id).await
        }
    })
    .await;
    outcome.attempts = attempts;

    match result {
        Ok(invoice) => {
            outcome.invoice_number = invoice.invoice_number();
            if let Some(number) = outcome.invoice_number {
                info!(order = seq, invoice_number = %number, attempts, "invoice created");
            }
        }
        Err(err) => {
            warn!(order = seq, attempts, error = %err, "gave up");
            outcome.error = Some(err.to_string());
        }
    }

    outcome
}

/// Soft-delete every invoice the run created. Errors are logged and ignored.
pub async fn cleanup<S>(service: &InvoiceService<S>, summary: &SimulationSummary)
where
    S: InvoiceStore,
{
    let ids: Vec<InvoiceId> = summary.outcomes.iter().filter_map(|o| o.invoice_id).collect();
    match service.delete_invoices(&ids).await {
        Ok(()) => info!(count = ids.len(), "simulation invoices cleaned up"),
        Err(err) => warn!(error = %err, "simulation cleanup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::jobs::{RetryPendingInvoices, SweepReport};
    use crate::store::{InMemoryInvoiceStore, InvoiceFilter};

    fn sim(injector: FailureInjector, orders: usize) -> SimulationConfig {
        SimulationConfig {
            orders,
            max_attempts: 10,
            backoff: BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(100)).unwrap(),
            injector,
            cleanup: false,
        }
    }

    fn outcome(number: Option<u64>) -> OrderOutcome {
        OrderOutcome {
            order_id: OrderId::new("order_x").unwrap(),
            invoice_id: None,
            invoice_number: number.map(|n| InvoiceNumber::new(n).unwrap()),
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn synthetic_ids_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let id = synthetic_order_id(&mut rng).unwrap();
            assert!(OrderId::is_well_formed(id.as_str()), "{id}");
        }
    }

    #[test]
    fn gap_detection() {
        let gapless = SimulationSummary {
            outcomes: vec![outcome(Some(3)), outcome(None), outcome(Some(1)), outcome(Some(2))],
        };
        assert!(gapless.is_gapless());
        assert_eq!(gapless.successful(), 3);
        assert_eq!(gapless.failed(), 1);
        assert_eq!(gapless.average_attempts(), 1.0);

        let holey = SimulationSummary {
            outcomes: vec![outcome(Some(1)), outcome(Some(3))],
        };
        assert!(!holey.is_contiguous());
        assert!(!holey.is_gapless());

        let repeated = SimulationSummary {
            outcomes: vec![outcome(Some(1)), outcome(Some(1)), outcome(Some(2))],
        };
        assert!(!repeated.is_gapless());

        let empty = SimulationSummary { outcomes: vec![outcome(None)] };
        assert!(empty.is_gapless());
    }

    #[test]
    fn contiguous_run_not_starting_at_one_is_not_gapless() {
        let offset = SimulationSummary {
            outcomes: vec![outcome(Some(3)), outcome(Some(2)), outcome(Some(4))],
        };

        assert!(offset.is_contiguous());
        assert!(!offset.is_gapless());
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_run_numbers_every_order_gaplessly() {
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));

        let summary = run_simulation(service, sim(FailureInjector::disabled(), 10)).await;

        assert_eq!(summary.successful(), 10);
        assert_eq!(summary.total_attempts(), 10);
        assert!(summary.is_gapless());
        assert_eq!(
            summary.assigned_numbers().iter().map(|n| n.get()).collect::<Vec<_>>(),
            (1..=10).collect::<Vec<_>>()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_leaves_everything_for_the_sweep() {
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        let always_fail = FailureInjector::new(1.0, true).unwrap();

        let summary = run_simulation(service.clone(), sim(always_fail, 5)).await;

        assert_eq!(summary.failed(), 5);
        assert!(summary.outcomes.iter().all(|o| o.attempts == 10));
        assert_eq!(service.list_pending().await.unwrap().len(), 5);

        let sweep = RetryPendingInvoices::new(service.clone(), &InvoiceConfig::default());
        assert_eq!(
            sweep.run_once().await,
            SweepReport { found: 5, assigned: 5, failed: 0 }
        );
        assert!(service.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_soft_deletes_synthetic_invoices() {
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        let config = SimulationConfig {
            cleanup: true,
            ..sim(FailureInjector::disabled(), 3)
        };

        run_simulation(service.clone(), config).await;

        let live = service.store().list(InvoiceFilter::default(), None, None).await.unwrap();
        assert!(live.is_empty());
    }
}

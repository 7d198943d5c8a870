use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{info, warn};

use billseq_events::{EventBus, OrderPlaced, Subscription};

use crate::store::InvoiceStore;
use crate::subscribers::OrderPlacedHandler;

use super::WorkerHandle;

/// Order-placed worker loop.
///
/// - Subscribes to an event bus
/// - Runs the handler for each event in its own task, so one slow order
///   never delays another
/// - Handler failures are logged, never propagated
/// - On shutdown, in-flight handlers are dropped; their invoices stay
///   pending for the sweep
#[derive(Debug)]
pub struct OrderPlacedWorker;

impl OrderPlacedWorker {
    pub fn spawn<B, S>(name: &'static str, bus: &B, handler: OrderPlacedHandler<S>) -> WorkerHandle
    where
        B: EventBus<OrderPlaced>,
        S: InvoiceStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let sub = bus.subscribe();

        let join = tokio::spawn(worker_loop(name, sub, shutdown_rx, handler));

        WorkerHandle::new(name, shutdown_tx, join)
    }
}

async fn worker_loop<S>(
    name: &'static str,
    mut sub: Subscription<OrderPlaced>,
    mut shutdown_rx: oneshot::Receiver<()>,
    handler: OrderPlacedHandler<S>,
) where
    S: InvoiceStore + 'static,
{
    info!(worker = name, "order placed worker started");
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            // Shutdown has priority.
            biased;

            _ = &mut shutdown_rx => break,

            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = joined {
                    warn!(worker = name, error = %err, "order placed handler panicked");
                }
            }

            msg = sub.recv() => {
                let Some(event) = msg else { break };
                let handler = handler.clone();
                in_flight.spawn(async move {
                    if let Err(err) = handler.handle(&event).await {
                        warn!(
                            worker = name,
                            order_id = %event.order_id,
                            error = %err,
                            "unexpected error in order placed handler"
                        );
                    }
                });
            }
        }
    }

    in_flight.shutdown().await;
    info!(worker = name, "order placed worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use billseq_core::OrderId;
    use billseq_events::InMemoryEventBus;

    use crate::config::InvoiceConfig;
    use crate::service::InvoiceService;
    use crate::store::InMemoryInvoiceStore;

    #[tokio::test]
    async fn worker_numbers_published_orders() {
        let bus = InMemoryEventBus::new();
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        let handler = OrderPlacedHandler::new(service.clone(), &InvoiceConfig::default());
        let worker = OrderPlacedWorker::spawn("order-placed-test", &bus, handler);

        for n in 0..3 {
            bus.publish(OrderPlaced::new(OrderId::new(format!("order_{n}")).unwrap()))
                .unwrap();
        }

        let mut created = 0;
        for _ in 0..100 {
            created = service
                .store()
                .list(Default::default(), None, None)
                .await
                .unwrap()
                .iter()
                .filter(|i| i.is_finalized())
                .count();
            if created == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(created, 3);
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn worker_stops_when_bus_is_dropped() {
        let bus = InMemoryEventBus::<OrderPlaced>::new();
        let service = Arc::new(InvoiceService::new(InMemoryInvoiceStore::new()));
        let handler = OrderPlacedHandler::new(service, &InvoiceConfig::default());
        let worker = OrderPlacedWorker::spawn("order-placed-test", &bus, handler);

        drop(bus);

        for _ in 0..100 {
            if worker.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(worker.is_finished());
    }
}

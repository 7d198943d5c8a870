use std::sync::Arc;

use tracing::info;

use billseq_events::{InMemoryEventBus, OrderPlaced};
use billseq_infra::store::StoreResult;
use billseq_infra::{
    InMemoryInvoiceStore, InvoiceConfig, InvoiceService, InvoiceStore, OrderPlacedHandler,
    OrderPlacedWorker, PostgresInvoiceStore, RetryPendingInvoices, WorkerHandle,
};

/// Store chosen at startup.
pub type DynStore = Arc<dyn InvoiceStore>;

/// Everything the handlers and background tasks share.
pub struct AppServices {
    pub config: InvoiceConfig,
    pub invoices: Arc<InvoiceService<DynStore>>,
    pub bus: Arc<InMemoryEventBus<OrderPlaced>>,
}

impl AppServices {
    pub fn new(config: InvoiceConfig, store: DynStore) -> Self {
        Self {
            config,
            invoices: Arc::new(InvoiceService::new(store)),
            bus: Arc::new(InMemoryEventBus::new()),
        }
    }

    /// In-memory store; used when no database is configured and by tests.
    pub fn in_memory(config: InvoiceConfig) -> Self {
        Self::new(config, Arc::new(InMemoryInvoiceStore::new()))
    }

    /// Start the order-placed worker and the pending-invoice sweep.
    pub fn start_background(&self) -> BackgroundTasks {
        let handler = OrderPlacedHandler::new(Arc::clone(&self.invoices), &self.config);
        let worker = OrderPlacedWorker::spawn("order-placed", &self.bus, handler);

        let sweep = RetryPendingInvoices::new(Arc::clone(&self.invoices), &self.config)
            .spawn("retry-pending-invoices");

        BackgroundTasks {
            handles: vec![worker, sweep],
        }
    }
}

/// Handles of the long-running tasks started by [`AppServices::start_background`].
#[derive(Debug)]
pub struct BackgroundTasks {
    handles: Vec<WorkerHandle>,
}

impl BackgroundTasks {
    pub async fn shutdown(self) {
        for handle in self.handles {
            let name = handle.name();
            handle.shutdown().await;
            info!(task = name, "background task stopped");
        }
    }
}

/// Postgres when `database_url` is set (schema ensured), in-memory otherwise.
pub async fn connect_store(database_url: Option<&str>) -> StoreResult<DynStore> {
    match database_url {
        Some(url) => {
            let store = PostgresInvoiceStore::connect(url).await?;
            store.ensure_schema().await?;
            info!("using postgres invoice store");
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set; using in-memory invoice store");
            Ok(Arc::new(InMemoryInvoiceStore::new()))
        }
    }
}

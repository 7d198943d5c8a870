//! Infrastructure layer: invoice storage, numbering service, retry engine,
//! background workers and configuration.

pub mod config;
pub mod jobs;
pub mod retry;
pub mod service;
pub mod simulation;
pub mod store;
pub mod subscribers;
pub mod workers;

pub use config::{ConfigError, DeploymentMode, InvoiceConfig};
pub use jobs::{RetryPendingInvoices, SweepReport};
pub use retry::{RetryOptions, retry_with_backoff};
pub use service::{ConflictRetry, InvoiceError, InvoiceService};
pub use store::{InMemoryInvoiceStore, InvoiceStore, PostgresInvoiceStore, StoreError};
pub use subscribers::OrderPlacedHandler;
pub use workers::{OrderPlacedWorker, WorkerHandle};

//! Long-running background tasks.

pub mod order_placed_worker;

pub use order_placed_worker::OrderPlacedWorker;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// Handle to control and join a background task.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn new(name: &'static str, shutdown: oneshot::Sender<()>, join: JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown,
            join,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request graceful shutdown and wait for the task to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.join.await {
            warn!(worker = self.name, error = %err, "worker task ended abnormally");
        }
    }
}

//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes order lifecycle events to in-process consumers (the
//! invoicing worker, tests). It is transport-agnostic and makes minimal
//! promises:
//!
//! - **At-least-once delivery**: consumers must be idempotent
//! - **No ordering guarantees** between publishers
//! - **No persistence**: anything that must survive a crash is recovered by the
//!   invoicing sweep, not by redelivery

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

/// A subscription to an event stream.
///
/// Each subscription gets its own copy of every message published after it was
/// created (broadcast semantics). Receiving is async and suspends only the
/// calling task.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means the bus was dropped; `Err(())` means the timeout elapsed.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<M>, ()> {
        tokio::time::timeout(timeout, self.receiver.recv())
            .await
            .map_err(|_| ())
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// `publish()` can fail (closed bus, poisoned lock); failures are surfaced to
/// the caller, which decides whether to retry. The trait requires
/// `Send + Sync` so publishers can live in HTTP handlers and background tasks.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

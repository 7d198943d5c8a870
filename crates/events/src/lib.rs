//! Order lifecycle events and the bus that carries them to invoicing.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::{Event, OrderPlaced};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

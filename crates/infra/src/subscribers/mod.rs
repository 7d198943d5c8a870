//! Event subscribers that drive the invoice pipeline.

pub mod order_placed;

pub use order_placed::OrderPlacedHandler;

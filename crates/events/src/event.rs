use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use billseq_core::OrderId;

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - delivered **at least once** (consumers must tolerate duplicates)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "order.placed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// An order was placed and now needs an invoice.
///
/// `event_id` identifies the delivery, not the order: a redelivered event keeps
/// its id, while two separate placements of the same order would not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub event_id: Uuid,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

impl OrderPlaced {
    pub const EVENT_TYPE: &'static str = "order.placed";

    pub fn new(order_id: OrderId) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            order_id,
            occurred_at: Utc::now(),
        }
    }
}

impl Event for OrderPlaced {
    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_placed_serializes_with_flat_order_id() {
        let order_id = OrderId::new("order_abc").unwrap();
        let event = OrderPlaced::new(order_id);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["order_id"], "order_abc");
        assert_eq!(event.event_type(), "order.placed");
        assert_eq!(event.version(), 1);

        let back: OrderPlaced = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

//! Outbox rows
//!
//! Persisted projection of a domain event. Written in the same transaction as
//! the aggregate state and updated, never deleted, once the relay delivers it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{DomainEvent, EventPayload};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboxRecord {
    /// Same as the event id
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub aggregate_type: String,
    pub tenant_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl OutboxRecord {
    pub fn from_event<P: EventPayload>(event: &DomainEvent<P>) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: event.event_id,
            aggregate_id: event.aggregate_id,
            aggregate_type: event.aggregate_type.to_string(),
            tenant_id: event.tenant_id,
            event_type: event.event_type.to_string(),
            payload: serde_json::to_value(&event.payload)?,
            created_at: event.occurred_at,
            published_at: None,
        })
    }

    /// Broker topic the relay publishes this record to
    pub fn topic(&self) -> String {
        format!("bank.{}", self.aggregate_type)
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }
}

/// Serialise every pending event of an aggregate, preserving order
pub(crate) fn records_for<P: EventPayload>(
    events: &[DomainEvent<P>],
) -> Result<Vec<OutboxRecord>, serde_json::Error> {
    events.iter().map(OutboxRecord::from_event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PaymentEvent;

    #[test]
    fn test_record_mirrors_event() {
        let payment_id = Uuid::new_v4();
        let event = DomainEvent::new(
            "payment_order",
            payment_id,
            Uuid::new_v4(),
            Utc::now(),
            PaymentEvent::Reversed {
                payment_id,
                reason: "customer dispute".into(),
            },
        );

        let record = OutboxRecord::from_event(&event).unwrap();

        assert_eq!(record.id, event.event_id);
        assert_eq!(record.event_type, "payment.order.reversed");
        assert_eq!(record.created_at, event.occurred_at);
        assert_eq!(record.topic(), "bank.payment_order");
        assert_eq!(record.payload["type"], "reversed");
        assert_eq!(record.payload["reason"], "customer dispute");
        assert!(!record.is_published());
    }
}

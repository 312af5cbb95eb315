//! Domain Events
//!
//! The envelope shared by every aggregate kind. Each aggregate defines its own
//! payload enum; the envelope adds identity, ownership and timing so that a
//! serialised event is self-describing once it leaves the process via the outbox.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Debug;
use uuid::Uuid;

/// A typed event payload belonging to one aggregate kind.
pub trait EventPayload: Serialize + Clone + Debug + Send + Sync + 'static {
    /// Dotted event type identifier, e.g. `payment.order.settled`.
    fn event_type(&self) -> &'static str;
}

/// An immutable fact about an aggregate, waiting to be written to the outbox.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent<P> {
    pub event_id: Uuid,
    pub event_type: &'static str,
    pub aggregate_id: Uuid,
    pub aggregate_type: &'static str,
    pub tenant_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: P,
}

impl<P: EventPayload> DomainEvent<P> {
    pub fn new(
        aggregate_type: &'static str,
        aggregate_id: Uuid,
        tenant_id: Uuid,
        occurred_at: DateTime<Utc>,
        payload: P,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: payload.event_type(),
            aggregate_id,
            aggregate_type,
            tenant_id,
            occurred_at,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum SampleEvent {
        Opened { note: String },
    }

    impl EventPayload for SampleEvent {
        fn event_type(&self) -> &'static str {
            "sample.thing.opened"
        }
    }

    #[test]
    fn test_envelope_takes_type_from_payload() {
        let aggregate_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let event = DomainEvent::new(
            "sample",
            aggregate_id,
            tenant_id,
            Utc::now(),
            SampleEvent::Opened { note: "hi".into() },
        );

        assert_eq!(event.event_type, "sample.thing.opened");
        assert_eq!(event.aggregate_id, aggregate_id);
        assert_eq!(event.tenant_id, tenant_id);
        assert_eq!(event.event_id.get_version_num(), 4);
    }

    #[test]
    fn test_envelope_serialises_tagged_payload() {
        let event = DomainEvent::new(
            "sample",
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
            SampleEvent::Opened { note: "hi".into() },
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "sample.thing.opened");
        assert_eq!(json["aggregate_type"], "sample");
        assert_eq!(json["payload"]["type"], "opened");
        assert_eq!(json["payload"]["note"], "hi");
    }
}

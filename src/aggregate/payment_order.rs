//! Payment Order Aggregate
//!
//! A payment instruction moving through
//! `INITIATED -> PROCESSING -> {SETTLED, FAILED}` and `SETTLED -> REVERSED`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Amount, Currency, DomainError, DomainEvent, EventPayload, RoutingInfo};

use super::{AggregateRoot, EventSource, Versioned};

string_enum! {
    /// Payment network used to move the funds
    pub enum PaymentRail {
        Ach => "ACH",
        FedNow => "FEDNOW",
        Swift => "SWIFT",
        Sepa => "SEPA",
        Chips => "CHIPS",
        Internal => "INTERNAL",
    }
}

string_enum! {
    pub enum PaymentStatus {
        Initiated => "INITIATED",
        Processing => "PROCESSING",
        Settled => "SETTLED",
        Failed => "FAILED",
        Reversed => "REVERSED",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Initiated {
        payment_id: Uuid,
        amount: Decimal,
        currency: Currency,
        rail: PaymentRail,
    },
    Processing {
        payment_id: Uuid,
        rail: PaymentRail,
    },
    Settled {
        payment_id: Uuid,
        settled_at: DateTime<Utc>,
    },
    Failed {
        payment_id: Uuid,
        failure_reason: String,
    },
    Reversed {
        payment_id: Uuid,
        reason: String,
    },
}

impl EventPayload for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::Initiated { .. } => "payment.order.initiated",
            PaymentEvent::Processing { .. } => "payment.order.processing",
            PaymentEvent::Settled { .. } => "payment.order.settled",
            PaymentEvent::Failed { .. } => "payment.order.failed",
            PaymentEvent::Reversed { .. } => "payment.order.reversed",
        }
    }
}

/// Input for [`PaymentOrder::initiate`]
#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub tenant_id: Uuid,
    pub source_account_id: Uuid,
    /// `None` for payments leaving the bank
    pub destination_account_id: Option<Uuid>,
    pub amount: Amount,
    pub currency: Currency,
    pub rail: PaymentRail,
    pub routing_info: RoutingInfo,
    pub reference: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub(crate) id: Uuid,
    pub(crate) tenant_id: Uuid,
    pub(crate) source_account_id: Uuid,
    pub(crate) destination_account_id: Option<Uuid>,
    pub(crate) amount: Amount,
    pub(crate) currency: Currency,
    pub(crate) rail: PaymentRail,
    pub(crate) status: PaymentStatus,
    pub(crate) routing_info: RoutingInfo,
    pub(crate) reference: String,
    pub(crate) description: String,
    pub(crate) failure_reason: Option<String>,
    pub(crate) initiated_at: DateTime<Utc>,
    pub(crate) settled_at: Option<DateTime<Utc>>,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) events: Vec<DomainEvent<PaymentEvent>>,
}

impl PaymentOrder {
    /// Create a new order in INITIATED status at version 1.
    pub fn initiate(input: NewPaymentOrder, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if input.tenant_id.is_nil() {
            return Err(DomainError::validation("tenant ID is required"));
        }
        if input.source_account_id.is_nil() {
            return Err(DomainError::validation("source account ID is required"));
        }
        if input.destination_account_id == Some(input.source_account_id) {
            return Err(DomainError::validation(
                "destination account must differ from source account",
            ));
        }

        let id = Uuid::new_v4();
        let event = DomainEvent::new(
            Self::AGGREGATE_TYPE,
            id,
            input.tenant_id,
            now,
            PaymentEvent::Initiated {
                payment_id: id,
                amount: input.amount.value(),
                currency: input.currency,
                rail: input.rail,
            },
        );

        Ok(Self {
            id,
            tenant_id: input.tenant_id,
            source_account_id: input.source_account_id,
            destination_account_id: input.destination_account_id,
            amount: input.amount,
            currency: input.currency,
            rail: input.rail,
            status: PaymentStatus::Initiated,
            routing_info: input.routing_info,
            reference: input.reference,
            description: input.description,
            failure_reason: None,
            initiated_at: now,
            settled_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
            events: vec![event],
        })
    }

    /// INITIATED -> PROCESSING
    pub fn mark_processing(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(PaymentStatus::Initiated, "mark processing")?;
        let payload = PaymentEvent::Processing {
            payment_id: self.id,
            rail: self.rail,
        };
        Ok(self.advance(now, payload, |o| o.status = PaymentStatus::Processing))
    }

    /// PROCESSING -> SETTLED
    pub fn settle(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(PaymentStatus::Processing, "settle")?;
        let payload = PaymentEvent::Settled {
            payment_id: self.id,
            settled_at: now,
        };
        Ok(self.advance(now, payload, |o| {
            o.status = PaymentStatus::Settled;
            o.settled_at = Some(now);
        }))
    }

    /// PROCESSING -> FAILED
    pub fn fail(&self, reason: &str, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(PaymentStatus::Processing, "fail")?;
        let payload = PaymentEvent::Failed {
            payment_id: self.id,
            failure_reason: reason.to_string(),
        };
        Ok(self.advance(now, payload, |o| {
            o.status = PaymentStatus::Failed;
            o.failure_reason = Some(reason.to_string());
        }))
    }

    /// SETTLED -> REVERSED
    pub fn reverse(&self, reason: &str, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(PaymentStatus::Settled, "reverse")?;
        let payload = PaymentEvent::Reversed {
            payment_id: self.id,
            reason: reason.to_string(),
        };
        Ok(self.advance(now, payload, |o| {
            o.status = PaymentStatus::Reversed;
            o.failure_reason = Some(reason.to_string());
        }))
    }

    fn require(&self, from: PaymentStatus, action: &str) -> Result<(), DomainError> {
        if self.status != from {
            return Err(DomainError::invalid_transition(format!(
                "can only {action} from {from} status, current: {}",
                self.status
            )));
        }
        Ok(())
    }

    fn advance(
        &self,
        now: DateTime<Utc>,
        payload: PaymentEvent,
        apply: impl FnOnce(&mut Self),
    ) -> Self {
        let mut next = self.clone();
        apply(&mut next);
        next.version += 1;
        next.updated_at = now;
        next.events.push(DomainEvent::new(
            Self::AGGREGATE_TYPE,
            self.id,
            self.tenant_id,
            now,
            payload,
        ));
        next
    }

    // Accessors

    pub fn source_account_id(&self) -> Uuid {
        self.source_account_id
    }

    pub fn destination_account_id(&self) -> Option<Uuid> {
        self.destination_account_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn rail(&self) -> PaymentRail {
        self.rail
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn routing_info(&self) -> &RoutingInfo {
        &self.routing_info
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn initiated_at(&self) -> DateTime<Utc> {
        self.initiated_at
    }

    pub fn settled_at(&self) -> Option<DateTime<Utc>> {
        self.settled_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Versioned for PaymentOrder {
    fn id(&self) -> Uuid {
        self.id
    }

    fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

impl EventSource for PaymentOrder {
    type Event = PaymentEvent;

    fn pending_events(&self) -> &[DomainEvent<PaymentEvent>] {
        &self.events
    }

    fn clear_events(mut self) -> Self {
        self.events.clear();
        self
    }
}

impl AggregateRoot for PaymentOrder {
    const AGGREGATE_TYPE: &'static str = "payment_order";
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_order() -> PaymentOrder {
        PaymentOrder::initiate(
            NewPaymentOrder {
                tenant_id: Uuid::new_v4(),
                source_account_id: Uuid::new_v4(),
                destination_account_id: None,
                amount: Amount::new(dec!(250.00)).unwrap(),
                currency: Currency::USD,
                rail: PaymentRail::Ach,
                routing_info: RoutingInfo::new("021000021", "12345678").unwrap(),
                reference: "INV-1".into(),
                description: "supplier".into(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_initiate_emits_single_event() {
        let order = new_order();

        assert_eq!(order.status(), PaymentStatus::Initiated);
        assert_eq!(order.version(), 1);
        assert_eq!(order.pending_events().len(), 1);
        assert_eq!(order.pending_events()[0].event_type, "payment.order.initiated");
        assert_eq!(order.expected_prior_version(), 0);
    }

    #[test]
    fn test_initiate_requires_tenant_and_source() {
        let mut input = NewPaymentOrder {
            tenant_id: Uuid::nil(),
            source_account_id: Uuid::new_v4(),
            destination_account_id: None,
            amount: Amount::from_integer(1).unwrap(),
            currency: Currency::USD,
            rail: PaymentRail::Internal,
            routing_info: RoutingInfo::default(),
            reference: String::new(),
            description: String::new(),
        };
        assert!(PaymentOrder::initiate(input.clone(), Utc::now()).is_err());

        input.tenant_id = Uuid::new_v4();
        input.source_account_id = Uuid::nil();
        assert!(PaymentOrder::initiate(input, Utc::now()).is_err());
    }

    #[test]
    fn test_happy_path_to_settled() {
        let now = Utc::now();
        let order = new_order();
        let processing = order.mark_processing(now).unwrap();
        let settled = processing.settle(now).unwrap();

        assert_eq!(settled.status(), PaymentStatus::Settled);
        assert_eq!(settled.version(), 3);
        assert_eq!(settled.settled_at(), Some(now));

        let types: Vec<_> = settled.pending_events().iter().map(|e| e.event_type).collect();
        assert_eq!(
            types,
            vec![
                "payment.order.initiated",
                "payment.order.processing",
                "payment.order.settled"
            ]
        );
        assert_eq!(settled.expected_prior_version(), 0);
    }

    #[test]
    fn test_settle_only_from_processing() {
        let order = new_order();
        let err = order.settle(Utc::now()).unwrap_err();

        assert!(matches!(err, DomainError::InvalidTransition(_)));
        assert!(err.to_string().contains("can only settle from PROCESSING status"));
        // Original instance untouched
        assert_eq!(order.status(), PaymentStatus::Initiated);
        assert_eq!(order.version(), 1);
        assert_eq!(order.pending_events().len(), 1);
    }

    #[test]
    fn test_reverse_only_from_settled() {
        let now = Utc::now();
        let processing = new_order().mark_processing(now).unwrap();
        assert!(processing.reverse("chargeback", now).is_err());

        let failed = processing.fail("rail timeout", now).unwrap();
        assert!(failed.reverse("chargeback", now).is_err());
        assert_eq!(failed.failure_reason(), Some("rail timeout"));

        let reversed = processing.settle(now).unwrap().reverse("chargeback", now).unwrap();
        assert_eq!(reversed.status(), PaymentStatus::Reversed);
        assert_eq!(reversed.version(), 4);
        assert!(reversed.settle(now).is_err());
    }

    #[test]
    fn test_clear_events_keeps_state() {
        let order = new_order().mark_processing(Utc::now()).unwrap();
        let cleared = order.clone().clear_events();

        assert!(cleared.pending_events().is_empty());
        assert_eq!(cleared.version(), order.version());
        assert_eq!(cleared.expected_prior_version(), 2);
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            PaymentStatus::Initiated,
            PaymentStatus::Processing,
            PaymentStatus::Settled,
            PaymentStatus::Failed,
            PaymentStatus::Reversed,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("SETTLING".parse::<PaymentStatus>().is_err());
    }
}

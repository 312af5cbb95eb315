//! Deposit Product Aggregate
//!
//! Product definition with a tiered interest schedule. Tiers are owned
//! children, persisted as rows and replaced wholesale on every save.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    validate_tiers, Currency, DomainError, DomainEvent, EventPayload, InterestTier,
};

use super::{AggregateRoot, EventSource, Versioned};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepositProductEvent {
    Created {
        product_id: Uuid,
        name: String,
        currency: Currency,
        tier_count: usize,
        term_days: u32,
    },
    TiersUpdated {
        product_id: Uuid,
        tiers: Vec<InterestTier>,
    },
    Deactivated {
        product_id: Uuid,
    },
}

impl EventPayload for DepositProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DepositProductEvent::Created { .. } => "deposit.product.created",
            DepositProductEvent::TiersUpdated { .. } => "deposit.product.tiers_updated",
            DepositProductEvent::Deactivated { .. } => "deposit.product.deactivated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepositProduct {
    pub(crate) id: Uuid,
    pub(crate) tenant_id: Uuid,
    pub(crate) name: String,
    pub(crate) currency: Currency,
    /// Sorted by minimum balance, non-overlapping
    pub(crate) tiers: Vec<InterestTier>,
    pub(crate) term_days: u32,
    pub(crate) is_active: bool,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) events: Vec<DomainEvent<DepositProductEvent>>,
}

impl DepositProduct {
    pub fn create(
        tenant_id: Uuid,
        name: &str,
        currency: Currency,
        tiers: Vec<InterestTier>,
        term_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if tenant_id.is_nil() {
            return Err(DomainError::validation("tenant ID is required"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("product name is required"));
        }
        let tiers = validate_tiers(tiers)?;

        let id = Uuid::new_v4();
        let event = DomainEvent::new(
            Self::AGGREGATE_TYPE,
            id,
            tenant_id,
            now,
            DepositProductEvent::Created {
                product_id: id,
                name: name.to_string(),
                currency,
                tier_count: tiers.len(),
                term_days,
            },
        );

        Ok(Self {
            id,
            tenant_id,
            name: name.to_string(),
            currency,
            tiers,
            term_days,
            is_active: true,
            version: 1,
            created_at: now,
            updated_at: now,
            events: vec![event],
        })
    }

    /// Replace the tier schedule of an active product.
    pub fn update_tiers(
        &self,
        tiers: Vec<InterestTier>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !self.is_active {
            return Err(DomainError::invalid_transition(
                "cannot update tiers on an inactive product",
            ));
        }
        let tiers = validate_tiers(tiers)?;
        let payload = DepositProductEvent::TiersUpdated {
            product_id: self.id,
            tiers: tiers.clone(),
        };
        Ok(self.advance(now, payload, |p| p.tiers = tiers))
    }

    pub fn deactivate(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if !self.is_active {
            return Err(DomainError::invalid_transition("product is already inactive"));
        }
        let payload = DepositProductEvent::Deactivated { product_id: self.id };
        Ok(self.advance(now, payload, |p| p.is_active = false))
    }

    fn advance(
        &self,
        now: DateTime<Utc>,
        payload: DepositProductEvent,
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

    /// The tier whose inclusive range contains `balance`.
    pub fn find_applicable_tier(&self, balance: Decimal) -> Result<&InterestTier, DomainError> {
        self.tiers
            .iter()
            .find(|tier| tier.applies(balance))
            .ok_or(DomainError::NoApplicableTier(balance))
    }

    pub fn is_term_deposit(&self) -> bool {
        self.term_days > 0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn tiers(&self) -> &[InterestTier] {
        &self.tiers
    }

    pub fn term_days(&self) -> u32 {
        self.term_days
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Versioned for DepositProduct {
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

impl EventSource for DepositProduct {
    type Event = DepositProductEvent;

    fn pending_events(&self) -> &[DomainEvent<DepositProductEvent>] {
        &self.events
    }

    fn clear_events(mut self) -> Self {
        self.events.clear();
        self
    }
}

impl AggregateRoot for DepositProduct {
    const AGGREGATE_TYPE: &'static str = "deposit_product";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateBps;
    use rust_decimal_macros::dec;

    fn tier(min: Decimal, max: Decimal, bps: u32) -> InterestTier {
        InterestTier::new(min, max, RateBps::new(bps)).unwrap()
    }

    fn savings() -> DepositProduct {
        DepositProduct::create(
            Uuid::new_v4(),
            "High Yield Savings",
            Currency::USD,
            vec![
                tier(dec!(10000), dec!(99999), 250),
                tier(dec!(0), dec!(9999.9999), 100),
            ],
            0,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_sorts_tiers_and_emits_event() {
        let product = savings();

        assert_eq!(product.tiers()[0].rate(), RateBps::new(100));
        assert_eq!(product.version(), 1);
        assert_eq!(product.pending_events()[0].event_type, "deposit.product.created");
        assert!(!product.is_term_deposit());
    }

    #[test]
    fn test_create_validation() {
        let tenant = Uuid::new_v4();
        let now = Utc::now();
        let tiers = || vec![tier(dec!(0), dec!(1), 1)];
        assert!(DepositProduct::create(tenant, " ", Currency::USD, tiers(), 0, now).is_err());
        assert!(DepositProduct::create(tenant, "x", Currency::USD, vec![], 0, now).is_err());
        assert!(DepositProduct::create(Uuid::nil(), "x", Currency::USD, tiers(), 0, now).is_err());
    }

    #[test]
    fn test_find_applicable_tier() {
        let product = savings();

        assert_eq!(
            product.find_applicable_tier(dec!(10020.5479)).unwrap().rate(),
            RateBps::new(250)
        );
        assert_eq!(product.find_applicable_tier(dec!(50)).unwrap().rate(), RateBps::new(100));
        assert!(matches!(
            product.find_applicable_tier(dec!(150000)),
            Err(DomainError::NoApplicableTier(_))
        ));
    }

    #[test]
    fn test_update_tiers_and_deactivate() {
        let now = Utc::now();
        let product = savings();
        let updated = product
            .update_tiers(vec![tier(dec!(0), dec!(1000000), 300)], now)
            .unwrap();
        assert_eq!(updated.tiers().len(), 1);
        assert_eq!(updated.version(), 2);
        assert_eq!(updated.pending_events()[1].event_type, "deposit.product.tiers_updated");

        let inactive = updated.deactivate(now).unwrap();
        assert!(!inactive.is_active());
        assert!(inactive.deactivate(now).is_err());
        assert!(inactive.update_tiers(vec![tier(dec!(0), dec!(1), 1)], now).is_err());
    }
}

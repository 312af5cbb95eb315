//! Deposit Position Aggregate
//!
//! A customer's holding in a deposit product. Tracks principal and accrued
//! interest through `ACTIVE -> MATURED -> CLOSED` (or `ACTIVE -> CLOSED`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{round_money, Amount, Currency, DomainError, DomainEvent, EventPayload};

use super::{AggregateRoot, EventSource, Versioned};

/// Interest is carried at four decimal places.
pub const INTEREST_SCALE: u32 = 4;

string_enum! {
    pub enum PositionStatus {
        Active => "ACTIVE",
        Matured => "MATURED",
        Closed => "CLOSED",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepositPositionEvent {
    Opened {
        position_id: Uuid,
        account_id: Uuid,
        product_id: Uuid,
        principal: Decimal,
        currency: Currency,
    },
    InterestAccrued {
        position_id: Uuid,
        account_id: Uuid,
        amount: Decimal,
        currency: Currency,
        as_of: DateTime<Utc>,
    },
    Matured {
        position_id: Uuid,
        account_id: Uuid,
    },
    Closed {
        position_id: Uuid,
        account_id: Uuid,
    },
}

impl EventPayload for DepositPositionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DepositPositionEvent::Opened { .. } => "deposit.position.opened",
            DepositPositionEvent::InterestAccrued { .. } => "deposit.interest.accrued",
            DepositPositionEvent::Matured { .. } => "deposit.position.matured",
            DepositPositionEvent::Closed { .. } => "deposit.position.closed",
        }
    }
}

/// Whole calendar days between two instants, both truncated to UTC midnight.
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to.date_naive() - from.date_naive()).num_days()
}

#[derive(Debug, Clone)]
pub struct DepositPosition {
    pub(crate) id: Uuid,
    pub(crate) tenant_id: Uuid,
    pub(crate) account_id: Uuid,
    pub(crate) product_id: Uuid,
    pub(crate) principal: Amount,
    pub(crate) currency: Currency,
    pub(crate) accrued_interest: Decimal,
    pub(crate) status: PositionStatus,
    pub(crate) opened_at: DateTime<Utc>,
    pub(crate) maturity_date: Option<DateTime<Utc>>,
    pub(crate) last_accrual_date: DateTime<Utc>,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) events: Vec<DomainEvent<DepositPositionEvent>>,
}

impl DepositPosition {
    /// Open a position in ACTIVE status; accrual starts from `now`.
    pub fn open(
        tenant_id: Uuid,
        account_id: Uuid,
        product_id: Uuid,
        principal: Amount,
        currency: Currency,
        maturity_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if tenant_id.is_nil() {
            return Err(DomainError::validation("tenant ID is required"));
        }
        if account_id.is_nil() {
            return Err(DomainError::validation("account ID is required"));
        }
        if product_id.is_nil() {
            return Err(DomainError::validation("product ID is required"));
        }
        if matches!(maturity_date, Some(m) if m <= now) {
            return Err(DomainError::validation("maturity date must be after the open date"));
        }

        let id = Uuid::new_v4();
        let event = DomainEvent::new(
            Self::AGGREGATE_TYPE,
            id,
            tenant_id,
            now,
            DepositPositionEvent::Opened {
                position_id: id,
                account_id,
                product_id,
                principal: principal.value(),
                currency,
            },
        );

        Ok(Self {
            id,
            tenant_id,
            account_id,
            product_id,
            principal,
            currency,
            accrued_interest: Decimal::ZERO,
            status: PositionStatus::Active,
            opened_at: now,
            maturity_date,
            last_accrual_date: now,
            version: 1,
            created_at: now,
            updated_at: now,
            events: vec![event],
        })
    }

    /// Interest the position would earn at `daily_rate` between the last
    /// accrual and `as_of`, rounded to four places. Does not change state.
    pub fn interest_for(
        &self,
        daily_rate: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<(Decimal, i64), DomainError> {
        if self.status != PositionStatus::Active {
            return Err(DomainError::invalid_transition(format!(
                "can only accrue interest on ACTIVE positions, current: {}",
                self.status
            )));
        }
        if as_of < self.last_accrual_date {
            return Err(DomainError::validation(format!(
                "accrual date {} is before last accrual date {}",
                as_of, self.last_accrual_date
            )));
        }

        let days = days_between(self.last_accrual_date, as_of);
        let interest = self.principal.value() * daily_rate * Decimal::from(days);
        Ok((round_money(interest, INTEREST_SCALE), days))
    }

    /// Add `principal * daily_rate * days` to the accrued interest.
    ///
    /// Zero elapsed days returns an unchanged copy with no event.
    pub fn accrue_interest(
        &self,
        daily_rate: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let (interest, days) = self.interest_for(daily_rate, as_of)?;
        if days == 0 {
            return Ok(self.clone());
        }

        let payload = DepositPositionEvent::InterestAccrued {
            position_id: self.id,
            account_id: self.account_id,
            amount: interest,
            currency: self.currency,
            as_of,
        };
        Ok(self.advance(as_of, payload, |p| {
            p.accrued_interest += interest;
            p.last_accrual_date = as_of;
        }))
    }

    /// ACTIVE -> MATURED
    pub fn mature(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.status != PositionStatus::Active {
            return Err(DomainError::invalid_transition(format!(
                "can only mature ACTIVE positions, current: {}",
                self.status
            )));
        }
        let payload = DepositPositionEvent::Matured {
            position_id: self.id,
            account_id: self.account_id,
        };
        Ok(self.advance(now, payload, |p| p.status = PositionStatus::Matured))
    }

    /// ACTIVE | MATURED -> CLOSED
    pub fn close(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.status == PositionStatus::Closed {
            return Err(DomainError::invalid_transition(
                "can only close ACTIVE or MATURED positions, current: CLOSED",
            ));
        }
        let payload = DepositPositionEvent::Closed {
            position_id: self.id,
            account_id: self.account_id,
        };
        Ok(self.advance(now, payload, |p| p.status = PositionStatus::Closed))
    }

    fn advance(
        &self,
        now: DateTime<Utc>,
        payload: DepositPositionEvent,
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

    /// Principal plus accrued interest; used for tier selection.
    pub fn total_balance(&self) -> Decimal {
        self.principal.value() + self.accrued_interest
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn principal(&self) -> Amount {
        self.principal
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn accrued_interest(&self) -> Decimal {
        self.accrued_interest
    }

    pub fn status(&self) -> PositionStatus {
        self.status
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn maturity_date(&self) -> Option<DateTime<Utc>> {
        self.maturity_date
    }

    pub fn last_accrual_date(&self) -> DateTime<Utc> {
        self.last_accrual_date
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Versioned for DepositPosition {
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

impl EventSource for DepositPosition {
    type Event = DepositPositionEvent;

    fn pending_events(&self) -> &[DomainEvent<DepositPositionEvent>] {
        &self.events
    }

    fn clear_events(mut self) -> Self {
        self.events.clear();
        self
    }
}

impl AggregateRoot for DepositPosition {
    const AGGREGATE_TYPE: &'static str = "deposit_position";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateBps;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn opened_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    fn position(principal: Decimal) -> DepositPosition {
        DepositPosition::open(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Amount::new(principal).unwrap(),
            Currency::USD,
            None,
            opened_at(),
        )
        .unwrap()
    }

    #[test]
    fn test_days_between_truncates_to_midnight() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 2, 0, 1, 0).unwrap();
        assert_eq!(days_between(from, to), 1);

        let same_day = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(days_between(same_day, from), 0);
    }

    #[test]
    fn test_accrue_thirty_days() {
        let pos = position(dec!(10000));
        let daily = RateBps::new(250).daily_rate();
        let accrued = pos.accrue_interest(daily, opened_at() + Duration::days(30)).unwrap();

        assert_eq!(accrued.accrued_interest(), dec!(20.5479));
        assert_eq!(accrued.version(), 2);
        assert_eq!(accrued.pending_events().len(), 2);
        assert_eq!(accrued.pending_events()[1].event_type, "deposit.interest.accrued");
        assert_eq!(accrued.last_accrual_date(), opened_at() + Duration::days(30));
    }

    #[test]
    fn test_same_day_accrual_is_noop() {
        let pos = position(dec!(10000));
        let daily = RateBps::new(250).daily_rate();
        let later_same_day = opened_at() + Duration::hours(10);
        let unchanged = pos.accrue_interest(daily, later_same_day).unwrap();

        assert_eq!(unchanged.accrued_interest(), Decimal::ZERO);
        assert_eq!(unchanged.version(), 1);
        assert_eq!(unchanged.pending_events().len(), 1);
        assert_eq!(unchanged.last_accrual_date(), opened_at());
    }

    #[test]
    fn test_accrue_before_last_accrual_rejected() {
        let pos = position(dec!(10000));
        let err = pos
            .accrue_interest(dec!(0.0001), opened_at() - Duration::days(1))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn test_accrue_requires_active() {
        let now = opened_at() + Duration::days(1);
        let matured = position(dec!(500)).mature(now).unwrap();
        let err = matured.accrue_interest(dec!(0.0001), now + Duration::days(5)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
    }

    #[test]
    fn test_lifecycle() {
        let now = opened_at() + Duration::days(90);
        let pos = position(dec!(1000));

        let early_close = pos.close(now).unwrap();
        assert_eq!(early_close.status(), PositionStatus::Closed);

        let matured = pos.mature(now).unwrap();
        assert!(matured.mature(now).is_err());
        let closed = matured.close(now).unwrap();
        assert_eq!(closed.version(), 3);
        assert!(closed.close(now).is_err());
        assert!(closed.mature(now).is_err());
    }

    #[test]
    fn test_open_rejects_past_maturity() {
        let result = DepositPosition::open(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Amount::from_integer(100).unwrap(),
            Currency::USD,
            Some(opened_at() - Duration::days(1)),
            opened_at(),
        );
        assert!(result.is_err());
    }
}

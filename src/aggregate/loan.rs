//! Loan Aggregate
//!
//! Servicing side of lending. A loan is born ACTIVE at disbursement with its
//! amortization schedule and then moves through
//! `ACTIVE <-> DELINQUENT -> DEFAULT -> WRITTEN_OFF` or to `PAID_OFF`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Amount, Currency, DomainError, DomainEvent, EventPayload, RateBps};
use crate::engine::amortization::{generate_schedule, AmortizationEntry};

use super::{AggregateRoot, EventSource, Versioned};

string_enum! {
    pub enum LoanStatus {
        Active => "ACTIVE",
        Delinquent => "DELINQUENT",
        Default => "DEFAULT",
        PaidOff => "PAID_OFF",
        WrittenOff => "WRITTEN_OFF",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoanEvent {
    Disbursed {
        loan_id: Uuid,
        application_id: Uuid,
        borrower_account_id: Uuid,
        principal: Decimal,
        currency: Currency,
        interest_rate_bps: u32,
        term_months: u32,
        first_payment_due: DateTime<Utc>,
    },
    PaymentReceived {
        loan_id: Uuid,
        amount: Decimal,
        currency: Currency,
        outstanding_balance: Decimal,
    },
    PaidOff {
        loan_id: Uuid,
        /// Present when a scheduled payment cleared the balance
        final_payment: Option<Decimal>,
    },
    Delinquent {
        loan_id: Uuid,
        outstanding_balance: Decimal,
    },
    Default {
        loan_id: Uuid,
        outstanding_balance: Decimal,
    },
    WrittenOff {
        loan_id: Uuid,
        outstanding_balance: Decimal,
    },
}

impl EventPayload for LoanEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoanEvent::Disbursed { .. } => "lending.loan.disbursed",
            LoanEvent::PaymentReceived { .. } => "lending.loan.payment_received",
            LoanEvent::PaidOff { .. } => "lending.loan.paid_off",
            LoanEvent::Delinquent { .. } => "lending.loan.delinquent",
            LoanEvent::Default { .. } => "lending.loan.default",
            LoanEvent::WrittenOff { .. } => "lending.loan.written_off",
        }
    }
}

/// Input for [`Loan::disburse`]
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub tenant_id: Uuid,
    pub application_id: Uuid,
    pub borrower_account_id: Uuid,
    pub principal: Amount,
    pub currency: Currency,
    pub interest_rate: RateBps,
    pub term_months: u32,
}

#[derive(Debug, Clone)]
pub struct Loan {
    pub(crate) id: Uuid,
    pub(crate) tenant_id: Uuid,
    pub(crate) application_id: Uuid,
    pub(crate) borrower_account_id: Uuid,
    pub(crate) principal: Amount,
    pub(crate) currency: Currency,
    pub(crate) interest_rate: RateBps,
    pub(crate) term_months: u32,
    pub(crate) status: LoanStatus,
    pub(crate) schedule: Vec<AmortizationEntry>,
    pub(crate) outstanding_balance: Decimal,
    pub(crate) next_payment_due: DateTime<Utc>,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) events: Vec<DomainEvent<LoanEvent>>,
}

impl Loan {
    /// Create an ACTIVE loan at version 1 with its schedule starting at `now`.
    pub fn disburse(input: NewLoan, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if input.tenant_id.is_nil() {
            return Err(DomainError::validation("tenant ID is required"));
        }
        if input.application_id.is_nil() {
            return Err(DomainError::validation("application ID is required"));
        }
        if input.borrower_account_id.is_nil() {
            return Err(DomainError::validation("borrower account ID is required"));
        }

        let schedule = generate_schedule(
            input.principal.value(),
            input.interest_rate,
            input.term_months,
            now,
        )?;
        let first_payment_due = schedule
            .first()
            .map(|entry| entry.due_date)
            .ok_or_else(|| DomainError::validation("term months must be positive"))?;

        let id = Uuid::new_v4();
        let event = DomainEvent::new(
            Self::AGGREGATE_TYPE,
            id,
            input.tenant_id,
            now,
            LoanEvent::Disbursed {
                loan_id: id,
                application_id: input.application_id,
                borrower_account_id: input.borrower_account_id,
                principal: input.principal.value(),
                currency: input.currency,
                interest_rate_bps: input.interest_rate.bps(),
                term_months: input.term_months,
                first_payment_due,
            },
        );

        Ok(Self {
            id,
            tenant_id: input.tenant_id,
            application_id: input.application_id,
            borrower_account_id: input.borrower_account_id,
            principal: input.principal,
            currency: input.currency,
            interest_rate: input.interest_rate,
            term_months: input.term_months,
            status: LoanStatus::Active,
            schedule,
            outstanding_balance: input.principal.value(),
            next_payment_due: first_payment_due,
            version: 1,
            created_at: now,
            updated_at: now,
            events: vec![event],
        })
    }

    /// Apply a payment to the outstanding balance.
    ///
    /// Overpayment is rejected outright. A payment that clears the balance
    /// moves the loan to PAID_OFF and emits only the paid-off event.
    pub fn make_payment(&self, amount: Amount, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if !matches!(self.status, LoanStatus::Active | LoanStatus::Delinquent) {
            return Err(DomainError::invalid_transition(format!(
                "payments can only be made on active or delinquent loans, current: {}",
                self.status
            )));
        }
        let amount = amount.value();
        if amount > self.outstanding_balance {
            return Err(DomainError::business_rule(format!(
                "payment {amount} exceeds outstanding balance {}",
                self.outstanding_balance
            )));
        }

        let remaining = self.outstanding_balance - amount;
        if remaining.is_zero() {
            let payload = LoanEvent::PaidOff {
                loan_id: self.id,
                final_payment: Some(amount),
            };
            return Ok(self.advance(now, payload, |l| {
                l.outstanding_balance = Decimal::ZERO;
                l.status = LoanStatus::PaidOff;
            }));
        }

        let payload = LoanEvent::PaymentReceived {
            loan_id: self.id,
            amount,
            currency: self.currency,
            outstanding_balance: remaining,
        };
        Ok(self.advance(now, payload, |l| l.outstanding_balance = remaining))
    }

    /// ACTIVE -> DELINQUENT
    pub fn mark_delinquent(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(&[LoanStatus::Active], LoanStatus::Delinquent)?;
        let payload = LoanEvent::Delinquent {
            loan_id: self.id,
            outstanding_balance: self.outstanding_balance,
        };
        Ok(self.advance(now, payload, |l| l.status = LoanStatus::Delinquent))
    }

    /// DELINQUENT -> DEFAULT
    pub fn mark_default(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(&[LoanStatus::Delinquent], LoanStatus::Default)?;
        let payload = LoanEvent::Default {
            loan_id: self.id,
            outstanding_balance: self.outstanding_balance,
        };
        Ok(self.advance(now, payload, |l| l.status = LoanStatus::Default))
    }

    /// Settle the loan in full regardless of the remaining balance.
    pub fn pay_off(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(
            &[LoanStatus::Active, LoanStatus::Delinquent, LoanStatus::Default],
            LoanStatus::PaidOff,
        )?;
        let payload = LoanEvent::PaidOff {
            loan_id: self.id,
            final_payment: None,
        };
        Ok(self.advance(now, payload, |l| {
            l.outstanding_balance = Decimal::ZERO;
            l.status = LoanStatus::PaidOff;
        }))
    }

    /// DEFAULT -> WRITTEN_OFF
    pub fn write_off(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(&[LoanStatus::Default], LoanStatus::WrittenOff)?;
        let payload = LoanEvent::WrittenOff {
            loan_id: self.id,
            outstanding_balance: self.outstanding_balance,
        };
        Ok(self.advance(now, payload, |l| l.status = LoanStatus::WrittenOff))
    }

    fn require(&self, allowed: &[LoanStatus], to: LoanStatus) -> Result<(), DomainError> {
        if !allowed.contains(&self.status) {
            return Err(DomainError::invalid_transition(format!(
                "cannot move loan from {} to {to}",
                self.status
            )));
        }
        Ok(())
    }

    fn advance(
        &self,
        now: DateTime<Utc>,
        payload: LoanEvent,
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

    pub fn application_id(&self) -> Uuid {
        self.application_id
    }

    pub fn borrower_account_id(&self) -> Uuid {
        self.borrower_account_id
    }

    pub fn principal(&self) -> Amount {
        self.principal
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn interest_rate(&self) -> RateBps {
        self.interest_rate
    }

    pub fn term_months(&self) -> u32 {
        self.term_months
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn schedule(&self) -> &[AmortizationEntry] {
        &self.schedule
    }

    pub fn outstanding_balance(&self) -> Decimal {
        self.outstanding_balance
    }

    pub fn next_payment_due(&self) -> DateTime<Utc> {
        self.next_payment_due
    }
}

impl Versioned for Loan {
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

impl EventSource for Loan {
    type Event = LoanEvent;

    fn pending_events(&self) -> &[DomainEvent<LoanEvent>] {
        &self.events
    }

    fn clear_events(mut self) -> Self {
        self.events.clear();
        self
    }
}

impl AggregateRoot for Loan {
    const AGGREGATE_TYPE: &'static str = "loan";
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn loan(principal: Decimal) -> Loan {
        Loan::disburse(
            NewLoan {
                tenant_id: Uuid::new_v4(),
                application_id: Uuid::new_v4(),
                borrower_account_id: Uuid::new_v4(),
                principal: Amount::new(principal).unwrap(),
                currency: Currency::USD,
                interest_rate: RateBps::new(550),
                term_months: 24,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn amount(value: Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[test]
    fn test_disburse_builds_schedule() {
        let loan = loan(dec!(12000));

        assert_eq!(loan.status(), LoanStatus::Active);
        assert_eq!(loan.version(), 1);
        assert_eq!(loan.schedule().len(), 24);
        assert_eq!(loan.outstanding_balance(), dec!(12000));
        assert_eq!(loan.next_payment_due(), loan.schedule()[0].due_date);
        assert_eq!(loan.pending_events()[0].event_type, "lending.loan.disbursed");
        let total: Decimal = loan.schedule().iter().map(|e| e.principal).sum();
        assert_eq!(total, dec!(12000));
    }

    #[test]
    fn test_partial_payment() {
        let paid = loan(dec!(1000)).make_payment(amount(dec!(250)), Utc::now()).unwrap();

        assert_eq!(paid.outstanding_balance(), dec!(750));
        assert_eq!(paid.status(), LoanStatus::Active);
        assert_eq!(paid.version(), 2);
        assert_eq!(paid.pending_events()[1].event_type, "lending.loan.payment_received");
    }

    #[test]
    fn test_exact_payment_pays_off_with_one_event() {
        let paid = loan(dec!(1000)).make_payment(amount(dec!(1000)), Utc::now()).unwrap();

        assert_eq!(paid.status(), LoanStatus::PaidOff);
        assert_eq!(paid.outstanding_balance(), Decimal::ZERO);
        assert_eq!(paid.version(), 2);
        assert_eq!(paid.pending_events().len(), 2);
        assert_eq!(paid.pending_events()[1].event_type, "lending.loan.paid_off");
    }

    #[test]
    fn test_overpayment_rejected() {
        let loan = loan(dec!(1000));
        let err = loan.make_payment(amount(dec!(1000.01)), Utc::now()).unwrap_err();

        assert!(matches!(err, DomainError::BusinessRuleViolation(_)));
        assert_eq!(loan.outstanding_balance(), dec!(1000));
    }

    #[test]
    fn test_collections_path() {
        let now = Utc::now();
        let delinquent = loan(dec!(5000)).mark_delinquent(now).unwrap();
        // Delinquent loans still accept payments
        let paid = delinquent.make_payment(amount(dec!(100)), now).unwrap();
        assert_eq!(paid.status(), LoanStatus::Delinquent);

        let defaulted = paid.mark_default(now).unwrap();
        assert!(defaulted.make_payment(amount(dec!(100)), now).is_err());
        let written_off = defaulted.write_off(now).unwrap();
        assert_eq!(written_off.status(), LoanStatus::WrittenOff);
        assert!(written_off.pay_off(now).is_err());
        assert_eq!(written_off.version(), 5);
    }

    #[test]
    fn test_pay_off() {
        let now = Utc::now();
        let paid = loan(dec!(5000)).pay_off(now).unwrap();
        assert_eq!(paid.outstanding_balance(), Decimal::ZERO);
        assert!(paid.pay_off(now).is_err());
        assert!(loan(dec!(5000)).write_off(now).is_err());
        assert!(loan(dec!(5000)).mark_default(now).is_err());
    }
}

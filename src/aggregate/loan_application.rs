//! Loan Application Aggregate
//!
//! Origination side of lending:
//! `SUBMITTED -> UNDER_REVIEW -> {APPROVED, REJECTED}` and `APPROVED -> DISBURSED`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Amount, Currency, DomainError, DomainEvent, EventPayload, RateBps};

use super::{AggregateRoot, EventSource, Versioned};

string_enum! {
    pub enum ApplicationStatus {
        Submitted => "SUBMITTED",
        UnderReview => "UNDER_REVIEW",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Disbursed => "DISBURSED",
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoanApplicationEvent {
    Submitted {
        application_id: Uuid,
        applicant_id: Uuid,
        requested_amount: Decimal,
        currency: Currency,
        term_months: u32,
        purpose: String,
    },
    UnderReview {
        application_id: Uuid,
    },
    Approved {
        application_id: Uuid,
        applicant_id: Uuid,
        reason: String,
        credit_score: u16,
        suggested_rate_bps: u32,
    },
    Rejected {
        application_id: Uuid,
        applicant_id: Uuid,
        reason: String,
    },
    Disbursed {
        application_id: Uuid,
        loan_id: Uuid,
    },
}

impl EventPayload for LoanApplicationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoanApplicationEvent::Submitted { .. } => "lending.loan_application.submitted",
            LoanApplicationEvent::UnderReview { .. } => "lending.loan_application.under_review",
            LoanApplicationEvent::Approved { .. } => "lending.loan_application.approved",
            LoanApplicationEvent::Rejected { .. } => "lending.loan_application.rejected",
            LoanApplicationEvent::Disbursed { .. } => "lending.loan_application.disbursed",
        }
    }
}

/// Input for [`LoanApplication::submit`]
#[derive(Debug, Clone)]
pub struct NewLoanApplication {
    pub tenant_id: Uuid,
    pub applicant_id: Uuid,
    pub requested_amount: Amount,
    pub currency: Currency,
    pub term_months: u32,
    pub purpose: String,
}

#[derive(Debug, Clone)]
pub struct LoanApplication {
    pub(crate) id: Uuid,
    pub(crate) tenant_id: Uuid,
    pub(crate) applicant_id: Uuid,
    pub(crate) requested_amount: Amount,
    pub(crate) currency: Currency,
    pub(crate) term_months: u32,
    pub(crate) purpose: String,
    pub(crate) status: ApplicationStatus,
    pub(crate) decision_reason: Option<String>,
    pub(crate) credit_score: Option<u16>,
    pub(crate) suggested_rate: Option<RateBps>,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) events: Vec<DomainEvent<LoanApplicationEvent>>,
}

impl LoanApplication {
    /// Create an application in SUBMITTED status.
    pub fn submit(input: NewLoanApplication, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if input.tenant_id.is_nil() {
            return Err(DomainError::validation("tenant ID is required"));
        }
        if input.applicant_id.is_nil() {
            return Err(DomainError::validation("applicant ID is required"));
        }
        if input.term_months == 0 {
            return Err(DomainError::validation("term months must be positive"));
        }

        let id = Uuid::new_v4();
        let event = DomainEvent::new(
            Self::AGGREGATE_TYPE,
            id,
            input.tenant_id,
            now,
            LoanApplicationEvent::Submitted {
                application_id: id,
                applicant_id: input.applicant_id,
                requested_amount: input.requested_amount.value(),
                currency: input.currency,
                term_months: input.term_months,
                purpose: input.purpose.clone(),
            },
        );

        Ok(Self {
            id,
            tenant_id: input.tenant_id,
            applicant_id: input.applicant_id,
            requested_amount: input.requested_amount,
            currency: input.currency,
            term_months: input.term_months,
            purpose: input.purpose,
            status: ApplicationStatus::Submitted,
            decision_reason: None,
            credit_score: None,
            suggested_rate: None,
            version: 1,
            created_at: now,
            updated_at: now,
            events: vec![event],
        })
    }

    /// SUBMITTED -> UNDER_REVIEW
    pub fn submit_for_review(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(ApplicationStatus::Submitted, "review")?;
        let payload = LoanApplicationEvent::UnderReview { application_id: self.id };
        Ok(self.advance(now, payload, |a| a.status = ApplicationStatus::UnderReview))
    }

    /// UNDER_REVIEW -> APPROVED, recording the score and the rate to lend at.
    pub fn approve(
        &self,
        reason: &str,
        credit_score: u16,
        suggested_rate: RateBps,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        self.require(ApplicationStatus::UnderReview, "approve")?;
        let payload = LoanApplicationEvent::Approved {
            application_id: self.id,
            applicant_id: self.applicant_id,
            reason: reason.to_string(),
            credit_score,
            suggested_rate_bps: suggested_rate.bps(),
        };
        Ok(self.advance(now, payload, |a| {
            a.status = ApplicationStatus::Approved;
            a.decision_reason = Some(reason.to_string());
            a.credit_score = Some(credit_score);
            a.suggested_rate = Some(suggested_rate);
        }))
    }

    /// UNDER_REVIEW -> REJECTED
    pub fn reject(
        &self,
        reason: &str,
        credit_score: Option<u16>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        self.require(ApplicationStatus::UnderReview, "reject")?;
        let payload = LoanApplicationEvent::Rejected {
            application_id: self.id,
            applicant_id: self.applicant_id,
            reason: reason.to_string(),
        };
        Ok(self.advance(now, payload, |a| {
            a.status = ApplicationStatus::Rejected;
            a.decision_reason = Some(reason.to_string());
            a.credit_score = credit_score;
        }))
    }

    /// APPROVED -> DISBURSED (terminal)
    pub fn mark_disbursed(&self, loan_id: Uuid, now: DateTime<Utc>) -> Result<Self, DomainError> {
        self.require(ApplicationStatus::Approved, "disburse")?;
        let payload = LoanApplicationEvent::Disbursed {
            application_id: self.id,
            loan_id,
        };
        Ok(self.advance(now, payload, |a| a.status = ApplicationStatus::Disbursed))
    }

    fn require(&self, from: ApplicationStatus, action: &str) -> Result<(), DomainError> {
        if self.status != from {
            return Err(DomainError::invalid_transition(format!(
                "can only {action} applications in {from} status, current: {}",
                self.status
            )));
        }
        Ok(())
    }

    fn advance(
        &self,
        now: DateTime<Utc>,
        payload: LoanApplicationEvent,
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

    pub fn applicant_id(&self) -> Uuid {
        self.applicant_id
    }

    pub fn requested_amount(&self) -> Amount {
        self.requested_amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn term_months(&self) -> u32 {
        self.term_months
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn status(&self) -> ApplicationStatus {
        self.status
    }

    pub fn decision_reason(&self) -> Option<&str> {
        self.decision_reason.as_deref()
    }

    pub fn credit_score(&self) -> Option<u16> {
        self.credit_score
    }

    pub fn suggested_rate(&self) -> Option<RateBps> {
        self.suggested_rate
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Versioned for LoanApplication {
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

impl EventSource for LoanApplication {
    type Event = LoanApplicationEvent;

    fn pending_events(&self) -> &[DomainEvent<LoanApplicationEvent>] {
        &self.events
    }

    fn clear_events(mut self) -> Self {
        self.events.clear();
        self
    }
}

impl AggregateRoot for LoanApplication {
    const AGGREGATE_TYPE: &'static str = "loan_application";
}

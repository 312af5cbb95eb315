//! Identity Verification Aggregate
//!
//! KYC/AML verification for one applicant. The aggregate owns its checks and
//! derives its own status from theirs whenever a check completes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{DomainError, DomainEvent, EventPayload};

use super::{AggregateRoot, EventSource, Versioned};

string_enum! {
    /// Status of the verification and of each of its checks
    pub enum VerificationStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Expired => "EXPIRED",
    }
}

impl VerificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }
}

/// Checks move through the same statuses as their parent.
pub type CheckStatus = VerificationStatus;

string_enum! {
    pub enum CheckType {
        Document => "DOCUMENT",
        Selfie => "SELFIE",
        Watchlist => "WATCHLIST",
        Address => "ADDRESS",
    }
}

/// Checks attached to every new verification, in order.
pub const DEFAULT_CHECK_TYPES: [CheckType; 3] =
    [CheckType::Document, CheckType::Selfie, CheckType::Watchlist];

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationEvent {
    Initiated {
        verification_id: Uuid,
        applicant_email: String,
        check_types: Vec<CheckType>,
    },
    ProcessingStarted {
        verification_id: Uuid,
    },
    CheckCompleted {
        verification_id: Uuid,
        check_id: Uuid,
        check_type: CheckType,
        status: CheckStatus,
    },
    Completed {
        verification_id: Uuid,
        applicant_email: String,
    },
    Rejected {
        verification_id: Uuid,
        applicant_email: String,
        check_id: Uuid,
        check_type: CheckType,
        failure_reason: Option<String>,
    },
    ProviderAssigned {
        verification_id: Uuid,
        check_id: Uuid,
        provider: String,
        provider_reference: String,
    },
}

impl EventPayload for VerificationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            VerificationEvent::Initiated { .. } => "identity.verification.initiated",
            VerificationEvent::ProcessingStarted { .. } => {
                "identity.verification.processing_started"
            }
            VerificationEvent::CheckCompleted { .. } => "identity.verification.check_completed",
            VerificationEvent::Completed { .. } => "identity.verification.completed",
            VerificationEvent::Rejected { .. } => "identity.verification.rejected",
            VerificationEvent::ProviderAssigned { .. } => "identity.verification.provider_assigned",
        }
    }
}

/// One verification step run by an external provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationCheck {
    pub(crate) id: Uuid,
    pub(crate) check_type: CheckType,
    pub(crate) status: CheckStatus,
    pub(crate) provider: Option<String>,
    pub(crate) provider_reference: Option<String>,
    pub(crate) failure_reason: Option<String>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl VerificationCheck {
    pub fn new(check_type: CheckType) -> Self {
        Self {
            id: Uuid::new_v4(),
            check_type,
            status: CheckStatus::Pending,
            provider: None,
            provider_reference: None,
            failure_reason: None,
            completed_at: None,
        }
    }

    /// Record a terminal outcome. The check must not already be terminal.
    pub fn complete(
        &self,
        status: CheckStatus,
        failure_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "check {} is already in terminal status {}",
                self.id, self.status
            )));
        }
        if !status.is_terminal() {
            return Err(DomainError::validation(format!(
                "check can only be completed with a terminal status, got {status}"
            )));
        }
        Ok(Self {
            status,
            failure_reason,
            completed_at: Some(now),
            ..self.clone()
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn check_type(&self) -> CheckType {
        self.check_type
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn provider_reference(&self) -> Option<&str> {
        self.provider_reference.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }
}

/// Applicant fields captured at initiation. All are required.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicantDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: String,
    pub country: String,
}

impl ApplicantDetails {
    fn validate(&self) -> Result<(), DomainError> {
        let required = [
            (&self.first_name, "applicant first name is required"),
            (&self.last_name, "applicant last name is required"),
            (&self.email, "applicant email is required"),
            (&self.date_of_birth, "applicant date of birth is required"),
            (&self.country, "applicant country is required"),
        ];
        for (value, message) in required {
            if value.trim().is_empty() {
                return Err(DomainError::validation(message));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IdentityVerification {
    pub(crate) id: Uuid,
    pub(crate) tenant_id: Uuid,
    pub(crate) applicant: ApplicantDetails,
    pub(crate) status: VerificationStatus,
    pub(crate) checks: Vec<VerificationCheck>,
    pub(crate) version: i64,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) events: Vec<DomainEvent<VerificationEvent>>,
}

impl IdentityVerification {
    /// Create a PENDING verification with the default checks.
    pub fn initiate(
        tenant_id: Uuid,
        applicant: ApplicantDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if tenant_id.is_nil() {
            return Err(DomainError::validation("tenant ID is required"));
        }
        applicant.validate()?;

        let id = Uuid::new_v4();
        let checks: Vec<_> = DEFAULT_CHECK_TYPES.into_iter().map(VerificationCheck::new).collect();
        let event = DomainEvent::new(
            Self::AGGREGATE_TYPE,
            id,
            tenant_id,
            now,
            VerificationEvent::Initiated {
                verification_id: id,
                applicant_email: applicant.email.clone(),
                check_types: DEFAULT_CHECK_TYPES.to_vec(),
            },
        );

        Ok(Self {
            id,
            tenant_id,
            applicant,
            status: VerificationStatus::Pending,
            checks,
            version: 1,
            created_at: now,
            updated_at: now,
            events: vec![event],
        })
    }

    /// PENDING -> IN_PROGRESS; pending checks start with it.
    pub fn start_processing(&self, now: DateTime<Utc>) -> Result<Self, DomainError> {
        if self.status != VerificationStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "can only start processing verifications in PENDING status, current: {}",
                self.status
            )));
        }
        let payload = VerificationEvent::ProcessingStarted { verification_id: self.id };
        Ok(self.advance(now, payload, |v| {
            v.status = VerificationStatus::InProgress;
            for check in v.checks.iter_mut().filter(|c| c.status == CheckStatus::Pending) {
                check.status = CheckStatus::InProgress;
            }
        }))
    }

    /// Complete one check and re-derive the overall status.
    ///
    /// Any rejected check rejects the verification at once. Once every check
    /// is terminal with no rejection the verification is approved. Otherwise
    /// it stays IN_PROGRESS.
    pub fn complete_check(
        &self,
        check_id: Uuid,
        status: CheckStatus,
        failure_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "verification {} is already in terminal status {}",
                self.id, self.status
            )));
        }
        if self.status != VerificationStatus::InProgress {
            return Err(DomainError::invalid_transition(format!(
                "checks can only be completed while IN_PROGRESS, current: {}",
                self.status
            )));
        }

        let index = self.check_index(check_id)?;
        let completed = self.checks[index].complete(status, failure_reason, now)?;

        let mut checks = self.checks.clone();
        checks[index] = completed.clone();

        let overall = Self::evaluate(&checks);
        let payload = match overall {
            VerificationStatus::Rejected => VerificationEvent::Rejected {
                verification_id: self.id,
                applicant_email: self.applicant.email.clone(),
                check_id,
                check_type: completed.check_type,
                failure_reason: completed.failure_reason.clone(),
            },
            VerificationStatus::Approved => VerificationEvent::Completed {
                verification_id: self.id,
                applicant_email: self.applicant.email.clone(),
            },
            _ => VerificationEvent::CheckCompleted {
                verification_id: self.id,
                check_id,
                check_type: completed.check_type,
                status: completed.status,
            },
        };

        Ok(self.advance(now, payload, |v| {
            v.checks = checks;
            v.status = overall;
        }))
    }

    /// Record which provider runs a check and its reference at that provider.
    pub fn assign_provider(
        &self,
        check_id: Uuid,
        provider: &str,
        provider_reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "verification {} is already in terminal status {}",
                self.id, self.status
            )));
        }
        if provider.trim().is_empty() {
            return Err(DomainError::validation("provider is required"));
        }
        let index = self.check_index(check_id)?;
        if self.checks[index].status.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "check {check_id} is already complete"
            )));
        }

        let payload = VerificationEvent::ProviderAssigned {
            verification_id: self.id,
            check_id,
            provider: provider.to_string(),
            provider_reference: provider_reference.to_string(),
        };
        Ok(self.advance(now, payload, |v| {
            let check = &mut v.checks[index];
            check.provider = Some(provider.to_string());
            check.provider_reference = Some(provider_reference.to_string());
        }))
    }

    fn evaluate(checks: &[VerificationCheck]) -> VerificationStatus {
        if checks.iter().any(|c| c.status == CheckStatus::Rejected) {
            VerificationStatus::Rejected
        } else if checks.iter().all(|c| c.status.is_terminal()) {
            VerificationStatus::Approved
        } else {
            VerificationStatus::InProgress
        }
    }

    fn check_index(&self, check_id: Uuid) -> Result<usize, DomainError> {
        self.checks
            .iter()
            .position(|c| c.id == check_id)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "check {check_id} not found in verification {}",
                    self.id
                ))
            })
    }

    fn advance(
        &self,
        now: DateTime<Utc>,
        payload: VerificationEvent,
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

    pub fn applicant(&self) -> &ApplicantDetails {
        &self.applicant
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    pub fn checks(&self) -> &[VerificationCheck] {
        &self.checks
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Versioned for IdentityVerification {
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

impl EventSource for IdentityVerification {
    type Event = VerificationEvent;

    fn pending_events(&self) -> &[DomainEvent<VerificationEvent>] {
        &self.events
    }

    fn clear_events(mut self) -> Self {
        self.events.clear();
        self
    }
}

impl AggregateRoot for IdentityVerification {
    const AGGREGATE_TYPE: &'static str = "identity_verification";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applicant() -> ApplicantDetails {
        ApplicantDetails {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            date_of_birth: "1990-01-15".into(),
            country: "GB".into(),
        }
    }

    fn in_progress() -> IdentityVerification {
        IdentityVerification::initiate(Uuid::new_v4(), applicant(), Utc::now())
            .unwrap()
            .start_processing(Utc::now())
            .unwrap()
    }

    fn last_event_type(v: &IdentityVerification) -> &'static str {
        v.pending_events().last().unwrap().event_type
    }

    #[test]
    fn test_initiate_with_default_checks() {
        let v = IdentityVerification::initiate(Uuid::new_v4(), applicant(), Utc::now()).unwrap();

        assert_eq!(v.status(), VerificationStatus::Pending);
        let types: Vec<_> = v.checks().iter().map(|c| c.check_type()).collect();
        assert_eq!(types, DEFAULT_CHECK_TYPES.to_vec());
        assert!(v.checks().iter().all(|c| c.status() == CheckStatus::Pending));
        assert_eq!(last_event_type(&v), "identity.verification.initiated");
    }

    #[test]
    fn test_initiate_requires_applicant_fields() {
        let mut details = applicant();
        details.date_of_birth = String::new();
        let err = IdentityVerification::initiate(Uuid::new_v4(), details, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("applicant date of birth is required"));
    }

    #[test]
    fn test_start_processing_moves_checks() {
        let v = in_progress();

        assert_eq!(v.status(), VerificationStatus::InProgress);
        assert_eq!(v.version(), 2);
        assert!(v.checks().iter().all(|c| c.status() == CheckStatus::InProgress));
        assert_eq!(last_event_type(&v), "identity.verification.processing_started");
        assert!(v.start_processing(Utc::now()).is_err());
    }

    #[test]
    fn test_rejection_short_circuits() {
        let v = in_progress();
        let second = v.checks()[1].id();

        let rejected = v
            .complete_check(second, CheckStatus::Rejected, Some("face mismatch".into()), Utc::now())
            .unwrap();

        assert_eq!(rejected.status(), VerificationStatus::Rejected);
        assert_eq!(rejected.checks()[0].status(), CheckStatus::InProgress);
        assert_eq!(rejected.checks()[2].status(), CheckStatus::InProgress);
        assert_eq!(rejected.version(), 3);
        assert_eq!(rejected.pending_events().len(), 3);
        assert_eq!(last_event_type(&rejected), "identity.verification.rejected");
    }

    #[test]
    fn test_rejection_after_partial_progress() {
        let now = Utc::now();
        let v = in_progress();
        let ids: Vec<_> = v.checks().iter().map(|c| c.id()).collect();

        let v = v.complete_check(ids[0], CheckStatus::Approved, None, now).unwrap();
        assert_eq!(v.status(), VerificationStatus::InProgress);
        assert_eq!(last_event_type(&v), "identity.verification.check_completed");

        let v = v.complete_check(ids[2], CheckStatus::Rejected, None, now).unwrap();
        assert_eq!(v.status(), VerificationStatus::Rejected);
        assert!(v.complete_check(ids[1], CheckStatus::Approved, None, now).is_err());
    }

    #[test]
    fn test_all_approved_in_any_order() {
        let now = Utc::now();
        let v = in_progress();
        let ids: Vec<_> = v.checks().iter().map(|c| c.id()).collect();

        let v = [ids[2], ids[0], ids[1]].into_iter().fold(v, |acc, id| {
            acc.complete_check(id, CheckStatus::Approved, None, now).unwrap()
        });

        assert_eq!(v.status(), VerificationStatus::Approved);
        assert_eq!(v.version(), 5);
        assert_eq!(last_event_type(&v), "identity.verification.completed");
        assert!(v.checks().iter().all(|c| c.completed_at().is_some()));
    }

    #[test]
    fn test_complete_check_errors() {
        let now = Utc::now();
        let pending = IdentityVerification::initiate(Uuid::new_v4(), applicant(), now).unwrap();
        let first = pending.checks()[0].id();
        assert!(matches!(
            pending.complete_check(first, CheckStatus::Approved, None, now),
            Err(DomainError::InvalidTransition(_))
        ));

        let v = in_progress();
        assert!(v.complete_check(Uuid::new_v4(), CheckStatus::Approved, None, now).is_err());

        let first = v.checks()[0].id();
        assert!(v.complete_check(first, CheckStatus::InProgress, None, now).is_err());

        let once = v.complete_check(first, CheckStatus::Approved, None, now).unwrap();
        assert!(once.complete_check(first, CheckStatus::Rejected, None, now).is_err());
    }

    #[test]
    fn test_assign_provider() {
        let v = in_progress();
        let check = v.checks()[0].id();
        let assigned = v.assign_provider(check, "persona", "inq_123", Utc::now()).unwrap();

        assert_eq!(assigned.checks()[0].provider(), Some("persona"));
        assert_eq!(assigned.checks()[0].provider_reference(), Some("inq_123"));
        assert_eq!(last_event_type(&assigned), "identity.verification.provider_assigned");
        assert!(v.assign_provider(check, " ", "x", Utc::now()).is_err());
    }
}

//! Identity Handler
//!
//! KYC verification use cases.

use chrono::Utc;
use uuid::Uuid;

use crate::aggregate::{ApplicantDetails, CheckStatus, IdentityVerification, Versioned};
use crate::domain::CallerContext;
use crate::error::{AppError, AppResult};
use crate::outbox::AggregateStore;

use super::{
    authorize_mutation, with_conflict_retry, AssignProviderCommand, CompleteCheckCommand,
    InitiateVerificationCommand, DEFAULT_SAVE_ATTEMPTS,
};

/// Handler for identity verifications
#[derive(Clone)]
pub struct IdentityHandler<S> {
    store: S,
    save_attempts: u32,
}

impl<S: AggregateStore> IdentityHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
        }
    }

    pub fn with_save_attempts(mut self, attempts: u32) -> Self {
        self.save_attempts = attempts;
        self
    }

    pub async fn initiate(
        &self,
        command: InitiateVerificationCommand,
        context: &CallerContext,
    ) -> AppResult<IdentityVerification> {
        authorize_mutation(context)?;

        let applicant = ApplicantDetails {
            first_name: command.first_name,
            last_name: command.last_name,
            email: command.email,
            date_of_birth: command.date_of_birth,
            country: command.country,
        };
        let verification =
            IdentityVerification::initiate(context.tenant_id, applicant, Utc::now())?;
        let verification = self.store.save(verification).await?;

        tracing::info!(
            verification_id = %verification.id(),
            tenant_id = %context.tenant_id,
            checks = verification.checks().len(),
            "Identity verification initiated"
        );
        Ok(verification)
    }

    /// PENDING -> IN_PROGRESS
    pub async fn start(
        &self,
        verification_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<IdentityVerification> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;

        with_conflict_retry(self.save_attempts, move || async move {
            let verification: IdentityVerification =
                self.store.find(tenant_id, verification_id).await?;
            let started = verification.start_processing(Utc::now())?;
            Ok::<_, AppError>(self.store.save(started).await?)
        })
        .await
    }

    /// Record one check outcome; the verification status follows from all checks
    pub async fn complete_check(
        &self,
        verification_id: Uuid,
        command: CompleteCheckCommand,
        context: &CallerContext,
    ) -> AppResult<IdentityVerification> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;
        let status: CheckStatus = command.status.trim().parse()?;
        let check_id = command.check_id;
        let failure_reason = command.failure_reason.as_deref();

        let verification = with_conflict_retry(self.save_attempts, move || async move {
            let verification: IdentityVerification =
                self.store.find(tenant_id, verification_id).await?;
            let updated = verification.complete_check(
                check_id,
                status,
                failure_reason.map(str::to_string),
                Utc::now(),
            )?;
            Ok::<_, AppError>(self.store.save(updated).await?)
        })
        .await?;

        tracing::info!(
            verification_id = %verification_id,
            check_id = %check_id,
            check_status = %status,
            status = %verification.status(),
            "Verification check completed"
        );
        Ok(verification)
    }

    pub async fn assign_provider(
        &self,
        verification_id: Uuid,
        command: AssignProviderCommand,
        context: &CallerContext,
    ) -> AppResult<IdentityVerification> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;
        let command = &command;

        with_conflict_retry(self.save_attempts, move || async move {
            let verification: IdentityVerification =
                self.store.find(tenant_id, verification_id).await?;
            let assigned = verification.assign_provider(
                command.check_id,
                &command.provider,
                &command.provider_reference,
                Utc::now(),
            )?;
            Ok::<_, AppError>(self.store.save(assigned).await?)
        })
        .await
    }

    pub async fn get(
        &self,
        verification_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<IdentityVerification> {
        Ok(self.store.find(context.tenant_id, verification_id).await?)
    }

    pub async fn list(&self, context: &CallerContext) -> AppResult<Vec<IdentityVerification>> {
        Ok(self.store.list(context.tenant_id).await?)
    }
}

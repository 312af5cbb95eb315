//! Lending Handler
//!
//! Loan applications with bureau-backed underwriting, disbursement and repayment.

use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::aggregate::{Loan, LoanApplication, NewLoan, NewLoanApplication, Versioned};
use crate::bureau::CreditBureauClient;
use crate::domain::{CallerContext, DomainError, RateBps};
use crate::engine::evaluate;
use crate::error::{AppError, AppResult};
use crate::outbox::AggregateStore;

use super::{
    authorize_mutation, parse_amount, parse_currency, with_conflict_retry, DisburseLoanCommand,
    MakeLoanPaymentCommand, SubmitLoanApplicationCommand, DEFAULT_SAVE_ATTEMPTS,
};

/// Default time allowed for one credit score lookup, retries included
pub const DEFAULT_BUREAU_TIMEOUT: Duration = Duration::from_secs(10);

/// Handler for loan applications and loans
#[derive(Clone)]
pub struct LendingHandler<S, B> {
    store: S,
    bureau: B,
    bureau_timeout: Duration,
    save_attempts: u32,
}

impl<S: AggregateStore, B: CreditBureauClient> LendingHandler<S, B> {
    pub fn new(store: S, bureau: B) -> Self {
        Self {
            store,
            bureau,
            bureau_timeout: DEFAULT_BUREAU_TIMEOUT,
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
        }
    }

    pub fn with_bureau_timeout(mut self, timeout: Duration) -> Self {
        self.bureau_timeout = timeout;
        self
    }

    pub fn with_save_attempts(mut self, attempts: u32) -> Self {
        self.save_attempts = attempts;
        self
    }

    /// Submit, review and decide an application in one step.
    ///
    /// Nothing is saved when the bureau cannot produce a score in time.
    pub async fn submit_application(
        &self,
        command: SubmitLoanApplicationCommand,
        context: &CallerContext,
    ) -> AppResult<LoanApplication> {
        authorize_mutation(context)?;

        let requested_amount = parse_amount(&command.requested_amount)?;
        let currency = parse_currency(&command.currency)?;
        let now = Utc::now();

        let application = LoanApplication::submit(
            NewLoanApplication {
                tenant_id: context.tenant_id,
                applicant_id: command.applicant_id,
                requested_amount,
                currency,
                term_months: command.term_months,
                purpose: command.purpose,
            },
            now,
        )?
        .submit_for_review(now)?;

        let deadline = tokio::time::Instant::now() + self.bureau_timeout;
        let score = self
            .bureau
            .get_credit_score(command.applicant_id, deadline)
            .await?;

        let decision = evaluate(score, requested_amount.value(), command.term_months);
        let decided = if decision.approved {
            application.approve(&decision.reason, score, decision.suggested_rate, now)?
        } else {
            application.reject(&decision.reason, Some(score), now)?
        };
        let decided = self.store.save(decided).await?;

        tracing::info!(
            application_id = %decided.id(),
            applicant_id = %command.applicant_id,
            credit_score = score,
            approved = decision.approved,
            reason = %decision.reason,
            "Loan application decided"
        );
        Ok(decided)
    }

    /// Create the loan from an APPROVED application.
    ///
    /// The application and the loan are saved in one transaction, so a
    /// disbursed application always has its loan.
    pub async fn disburse(
        &self,
        command: DisburseLoanCommand,
        context: &CallerContext,
    ) -> AppResult<Loan> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;
        let command = &command;

        let loan = with_conflict_retry(self.save_attempts, move || async move {
            let application: LoanApplication =
                self.store.find(tenant_id, command.application_id).await?;
            let rate = command
                .interest_rate_bps
                .map(RateBps::new)
                .or(application.suggested_rate())
                .ok_or_else(|| DomainError::validation("interest rate is required"))?;

            let now = Utc::now();
            let loan = Loan::disburse(
                NewLoan {
                    tenant_id,
                    application_id: application.id(),
                    borrower_account_id: command.borrower_account_id,
                    principal: application.requested_amount(),
                    currency: application.currency(),
                    interest_rate: rate,
                    term_months: application.term_months(),
                },
                now,
            )?;
            let application = application.mark_disbursed(loan.id(), now)?;

            let (_, loan) = self.store.save_pair(application, loan).await?;
            Ok::<_, AppError>(loan)
        })
        .await?;

        tracing::info!(
            loan_id = %loan.id(),
            application_id = %command.application_id,
            principal = %loan.principal(),
            rate_bps = loan.interest_rate().bps(),
            "Loan disbursed"
        );
        Ok(loan)
    }

    pub async fn make_payment(
        &self,
        loan_id: Uuid,
        command: MakeLoanPaymentCommand,
        context: &CallerContext,
    ) -> AppResult<Loan> {
        authorize_mutation(context)?;
        let tenant_id = context.tenant_id;
        let amount = parse_amount(&command.amount)?;

        let loan = with_conflict_retry(self.save_attempts, move || async move {
            let loan: Loan = self.store.find(tenant_id, loan_id).await?;
            let paid = loan.make_payment(amount, Utc::now())?;
            Ok::<_, AppError>(self.store.save(paid).await?)
        })
        .await?;

        tracing::info!(
            loan_id = %loan_id,
            amount = %amount,
            outstanding = %loan.outstanding_balance(),
            status = %loan.status(),
            "Loan payment received"
        );
        Ok(loan)
    }

    pub async fn get_loan(&self, loan_id: Uuid, context: &CallerContext) -> AppResult<Loan> {
        Ok(self.store.find(context.tenant_id, loan_id).await?)
    }

    pub async fn get_application(
        &self,
        application_id: Uuid,
        context: &CallerContext,
    ) -> AppResult<LoanApplication> {
        Ok(self.store.find(context.tenant_id, application_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{ApplicationStatus, LoanStatus};
    use crate::bureau::BureauError;
    use crate::domain::CallerRole;
    use crate::outbox::InMemoryStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    /// Bureau that always answers with one score
    struct FixedBureau(u16);

    #[async_trait]
    impl CreditBureauClient for FixedBureau {
        async fn get_credit_score(
            &self,
            _applicant_id: Uuid,
            _deadline: tokio::time::Instant,
        ) -> Result<u16, BureauError> {
            Ok(self.0)
        }
    }

    struct DownBureau;

    #[async_trait]
    impl CreditBureauClient for DownBureau {
        async fn get_credit_score(
            &self,
            _applicant_id: Uuid,
            _deadline: tokio::time::Instant,
        ) -> Result<u16, BureauError> {
            Err(BureauError::DeadlineExceeded)
        }
    }

    fn operator() -> CallerContext {
        CallerContext::new(Uuid::new_v4(), CallerRole::Operator)
    }

    fn application(amount: &str, term_months: u32) -> SubmitLoanApplicationCommand {
        SubmitLoanApplicationCommand {
            applicant_id: Uuid::new_v4(),
            requested_amount: amount.into(),
            currency: "USD".into(),
            term_months,
            purpose: "home improvement".into(),
        }
    }

    #[tokio::test]
    async fn test_good_score_approved_with_suggested_rate() {
        let store = InMemoryStore::new();
        let handler = LendingHandler::new(store.clone(), FixedBureau(720));
        let context = operator();

        let app = handler.submit_application(application("50000", 60), &context).await.unwrap();

        assert_eq!(app.status(), ApplicationStatus::Approved);
        assert_eq!(app.credit_score(), Some(720));
        assert_eq!(app.suggested_rate(), Some(RateBps::new(550)));
        assert_eq!(app.version(), 3);

        let types: Vec<String> = store
            .outbox_records()
            .await
            .into_iter()
            .map(|r| r.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                "lending.loan_application.submitted",
                "lending.loan_application.under_review",
                "lending.loan_application.approved"
            ]
        );
    }

    #[tokio::test]
    async fn test_low_score_rejected() {
        let handler = LendingHandler::new(InMemoryStore::new(), FixedBureau(550));
        let context = operator();

        let app = handler.submit_application(application("5000", 12), &context).await.unwrap();

        assert_eq!(app.status(), ApplicationStatus::Rejected);
        assert!(app.decision_reason().unwrap().contains("minimum"));
    }

    #[tokio::test]
    async fn test_bureau_failure_saves_nothing() {
        let store = InMemoryStore::new();
        let handler = LendingHandler::new(store.clone(), DownBureau);

        let err = handler
            .submit_application(application("5000", 12), &operator())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Bureau(BureauError::DeadlineExceeded)));
        assert!(store.outbox_records().await.is_empty());
    }

    #[tokio::test]
    async fn test_disburse_and_repay() {
        let handler = LendingHandler::new(InMemoryStore::new(), FixedBureau(780));
        let context = operator();
        let app = handler.submit_application(application("1200", 12), &context).await.unwrap();

        let loan = handler
            .disburse(
                DisburseLoanCommand {
                    application_id: app.id(),
                    borrower_account_id: Uuid::new_v4(),
                    interest_rate_bps: Some(0),
                },
                &context,
            )
            .await
            .unwrap();
        assert_eq!(loan.status(), LoanStatus::Active);
        assert_eq!(loan.schedule().len(), 12);
        assert_eq!(loan.outstanding_balance(), dec!(1200));

        let stored_app = handler.get_application(app.id(), &context).await.unwrap();
        assert_eq!(stored_app.status(), ApplicationStatus::Disbursed);

        let paid = handler
            .make_payment(loan.id(), MakeLoanPaymentCommand { amount: "100".into() }, &context)
            .await
            .unwrap();
        assert_eq!(paid.outstanding_balance(), dec!(1100));

        let paid_off = handler
            .make_payment(loan.id(), MakeLoanPaymentCommand { amount: "1100".into() }, &context)
            .await
            .unwrap();
        assert_eq!(paid_off.status(), LoanStatus::PaidOff);

        let err = handler
            .make_payment(loan.id(), MakeLoanPaymentCommand { amount: "1".into() }, &context)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_disburse_twice_rejected() {
        let handler = LendingHandler::new(InMemoryStore::new(), FixedBureau(780));
        let context = operator();
        let app = handler.submit_application(application("1200", 12), &context).await.unwrap();
        let command = DisburseLoanCommand {
            application_id: app.id(),
            borrower_account_id: Uuid::new_v4(),
            interest_rate_bps: None,
        };

        let loan = handler.disburse(command.clone(), &context).await.unwrap();
        assert_eq!(loan.interest_rate(), RateBps::new(450));

        let err = handler.disburse(command, &context).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_rejected_application_cannot_disburse() {
        let handler = LendingHandler::new(InMemoryStore::new(), FixedBureau(400));
        let context = operator();
        let app = handler.submit_application(application("1200", 12), &context).await.unwrap();

        let err = handler
            .disburse(
                DisburseLoanCommand {
                    application_id: app.id(),
                    borrower_account_id: Uuid::new_v4(),
                    interest_rate_bps: Some(500),
                },
                &context,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Domain(_)));
    }
}

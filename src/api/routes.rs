//! API Routes
//!
//! One POST route per mutating use case and one GET route per read.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{
    ApplicantDetails, Campaign, DepositPosition, DepositProduct, IdentityVerification, Loan,
    LoanApplication, PaymentOrder, Versioned,
};
use crate::bureau::CreditBureauClient;
use crate::domain::CallerContext;
use crate::engine::AmortizationEntry;
use crate::error::AppResult;
use crate::handlers::{
    AccrualBatchResult, AccrueInterestCommand, ApplyCampaignRateCommand, AssignProviderCommand,
    CampaignRateResult, CompleteCheckCommand, CreateCampaignCommand, CreateDepositProductCommand,
    DepositHandler, DisburseLoanCommand, IdentityHandler, InitiatePaymentCommand,
    InitiateVerificationCommand, LendingHandler, ListPaymentsQuery, MakeLoanPaymentCommand,
    OpenDepositPositionCommand, PaymentHandler, RailAdapter, ReversePaymentCommand,
    SubmitLoanApplicationCommand,
};
use crate::outbox::AggregateStore;
use crate::Config;

use super::middleware::{ApiJson, ApiPath, ApiQuery};

// =========================================================================
// Application state
// =========================================================================

/// Handlers shared by every route
#[derive(Clone)]
pub struct AppState<S> {
    pub payments: PaymentHandler<S, Arc<dyn RailAdapter>>,
    pub deposits: DepositHandler<S>,
    pub identity: IdentityHandler<S>,
    pub lending: LendingHandler<S, Arc<dyn CreditBureauClient>>,
}

impl<S: AggregateStore + Clone> AppState<S> {
    pub fn new(store: S, rail: Arc<dyn RailAdapter>, bureau: Arc<dyn CreditBureauClient>) -> Self {
        Self {
            payments: PaymentHandler::with_rail(store.clone(), rail),
            deposits: DepositHandler::new(store.clone()),
            identity: IdentityHandler::new(store.clone()),
            lending: LendingHandler::new(store, bureau),
        }
    }

    /// Apply save retry and bureau deadline settings
    pub fn configured(self, config: &Config) -> Self {
        self.tuned(config.save_max_attempts, config.bureau_timeout)
    }

    pub fn tuned(self, save_attempts: u32, bureau_timeout: Duration) -> Self {
        Self {
            payments: self.payments.with_save_attempts(save_attempts),
            deposits: self.deposits.with_save_attempts(save_attempts),
            identity: self.identity.with_save_attempts(save_attempts),
            lending: self
                .lending
                .with_save_attempts(save_attempts)
                .with_bureau_timeout(bureau_timeout),
        }
    }
}

// =========================================================================
// Response types
// =========================================================================

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub source_account_id: Uuid,
    pub destination_account_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub rail: String,
    pub status: String,
    pub routing_number: String,
    pub external_account_number: String,
    pub reference: String,
    pub description: String,
    pub failure_reason: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentOrder> for PaymentView {
    fn from(order: &PaymentOrder) -> Self {
        Self {
            id: order.id(),
            source_account_id: order.source_account_id(),
            destination_account_id: order.destination_account_id(),
            amount: order.amount().value(),
            currency: order.currency().to_string(),
            rail: order.rail().to_string(),
            status: order.status().to_string(),
            routing_number: order.routing_info().routing_number().to_string(),
            external_account_number: order.routing_info().external_account_number().to_string(),
            reference: order.reference().to_string(),
            description: order.description().to_string(),
            failure_reason: order.failure_reason().map(str::to_string),
            initiated_at: order.initiated_at(),
            settled_at: order.settled_at(),
            version: order.version(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentListView {
    pub payments: Vec<PaymentView>,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct TierView {
    pub min_balance: Decimal,
    pub max_balance: Decimal,
    pub rate_bps: u32,
}

#[derive(Debug, Serialize)]
pub struct DepositProductView {
    pub id: Uuid,
    pub name: String,
    pub currency: String,
    pub tiers: Vec<TierView>,
    pub term_days: u32,
    pub is_active: bool,
    pub version: i64,
}

impl From<&DepositProduct> for DepositProductView {
    fn from(product: &DepositProduct) -> Self {
        Self {
            id: product.id(),
            name: product.name().to_string(),
            currency: product.currency().to_string(),
            tiers: product
                .tiers()
                .iter()
                .map(|t| TierView {
                    min_balance: t.min_balance(),
                    max_balance: t.max_balance(),
                    rate_bps: t.rate().bps(),
                })
                .collect(),
            term_days: product.term_days(),
            is_active: product.is_active(),
            version: product.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PositionView {
    pub id: Uuid,
    pub account_id: Uuid,
    pub product_id: Uuid,
    pub principal: Decimal,
    pub currency: String,
    pub accrued_interest: Decimal,
    pub total_balance: Decimal,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub maturity_date: Option<DateTime<Utc>>,
    pub last_accrual_date: DateTime<Utc>,
    pub version: i64,
}

impl From<&DepositPosition> for PositionView {
    fn from(position: &DepositPosition) -> Self {
        Self {
            id: position.id(),
            account_id: position.account_id(),
            product_id: position.product_id(),
            principal: position.principal().value(),
            currency: position.currency().to_string(),
            accrued_interest: position.accrued_interest(),
            total_balance: position.total_balance(),
            status: position.status().to_string(),
            opened_at: position.opened_at(),
            maturity_date: position.maturity_date(),
            last_accrual_date: position.last_accrual_date(),
            version: position.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CampaignView {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub product_id: Uuid,
    pub bonus_rate_bps: u32,
    pub eligibility_criteria: String,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    pub target_audience: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: String,
    pub total_enrollments: i64,
    pub total_deposit_value: Decimal,
    pub version: i64,
}

impl From<&Campaign> for CampaignView {
    fn from(campaign: &Campaign) -> Self {
        let promo = campaign.promotional_rate();
        Self {
            id: campaign.id(),
            name: campaign.name().to_string(),
            description: campaign.description().to_string(),
            product_id: campaign.product_id(),
            bonus_rate_bps: promo.bonus_rate().bps(),
            eligibility_criteria: promo.eligibility_criteria().to_string(),
            min_deposit: promo.min_deposit(),
            max_deposit: promo.max_deposit(),
            target_audience: campaign.target_audience().to_string(),
            start_date: campaign.start_date(),
            end_date: campaign.end_date(),
            status: campaign.status().to_string(),
            total_enrollments: campaign.total_enrollments(),
            total_deposit_value: campaign.total_deposit_value(),
            version: campaign.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CampaignRateView {
    pub position: PositionView,
    pub campaign: CampaignView,
    pub bonus_interest: Decimal,
    pub total_interest: Decimal,
    pub standard_rate_bps: u32,
    pub bonus_rate_bps: u32,
    pub effective_rate_bps: u32,
}

impl From<&CampaignRateResult> for CampaignRateView {
    fn from(result: &CampaignRateResult) -> Self {
        Self {
            position: (&result.position).into(),
            campaign: (&result.campaign).into(),
            bonus_interest: result.bonus_interest,
            total_interest: result.total_interest,
            standard_rate_bps: result.standard_rate_bps,
            bonus_rate_bps: result.bonus_rate_bps,
            effective_rate_bps: result.effective_rate_bps,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckView {
    pub id: Uuid,
    pub check_type: String,
    pub status: String,
    pub provider: Option<String>,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct VerificationView {
    pub id: Uuid,
    pub applicant: ApplicantDetails,
    pub status: String,
    pub checks: Vec<CheckView>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&IdentityVerification> for VerificationView {
    fn from(verification: &IdentityVerification) -> Self {
        Self {
            id: verification.id(),
            applicant: verification.applicant().clone(),
            status: verification.status().to_string(),
            checks: verification
                .checks()
                .iter()
                .map(|c| CheckView {
                    id: c.id(),
                    check_type: c.check_type().to_string(),
                    status: c.status().to_string(),
                    provider: c.provider().map(str::to_string),
                    provider_reference: c.provider_reference().map(str::to_string),
                    failure_reason: c.failure_reason().map(str::to_string),
                    completed_at: c.completed_at(),
                })
                .collect(),
            version: verification.version(),
            created_at: verification.created_at(),
            updated_at: verification.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoanApplicationView {
    pub id: Uuid,
    pub applicant_id: Uuid,
    pub requested_amount: Decimal,
    pub currency: String,
    pub term_months: u32,
    pub purpose: String,
    pub status: String,
    pub decision_reason: Option<String>,
    pub credit_score: Option<u16>,
    pub suggested_rate_bps: Option<u32>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&LoanApplication> for LoanApplicationView {
    fn from(application: &LoanApplication) -> Self {
        Self {
            id: application.id(),
            applicant_id: application.applicant_id(),
            requested_amount: application.requested_amount().value(),
            currency: application.currency().to_string(),
            term_months: application.term_months(),
            purpose: application.purpose().to_string(),
            status: application.status().to_string(),
            decision_reason: application.decision_reason().map(str::to_string),
            credit_score: application.credit_score(),
            suggested_rate_bps: application.suggested_rate().map(|r| r.bps()),
            version: application.version(),
            created_at: application.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoanView {
    pub id: Uuid,
    pub application_id: Uuid,
    pub borrower_account_id: Uuid,
    pub principal: Decimal,
    pub currency: String,
    pub interest_rate_bps: u32,
    pub term_months: u32,
    pub status: String,
    pub outstanding_balance: Decimal,
    pub next_payment_due: DateTime<Utc>,
    pub schedule: Vec<AmortizationEntry>,
    pub version: i64,
}

impl From<&Loan> for LoanView {
    fn from(loan: &Loan) -> Self {
        Self {
            id: loan.id(),
            application_id: loan.application_id(),
            borrower_account_id: loan.borrower_account_id(),
            principal: loan.principal().value(),
            currency: loan.currency().to_string(),
            interest_rate_bps: loan.interest_rate().bps(),
            term_months: loan.term_months(),
            status: loan.status().to_string(),
            outstanding_balance: loan.outstanding_balance(),
            next_payment_due: loan.next_payment_due(),
            schedule: loan.schedule().to_vec(),
            version: loan.version(),
        }
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router<S>() -> Router<AppState<S>>
where
    S: AggregateStore + Clone + 'static,
{
    Router::new()
        // Payments
        .route(
            "/payments",
            post(initiate_payment::<S>).get(list_payments::<S>),
        )
        .route("/payments/:payment_id", get(get_payment::<S>))
        .route("/payments/:payment_id/process", post(process_payment::<S>))
        .route("/payments/:payment_id/reverse", post(reverse_payment::<S>))
        // Deposits
        .route("/deposit-products", post(create_deposit_product::<S>))
        .route("/deposit-products/:product_id", get(get_deposit_product::<S>))
        .route("/deposit-positions", post(open_deposit_position::<S>))
        .route("/deposit-positions/:position_id", get(get_deposit_position::<S>))
        .route("/deposit-positions/:position_id/mature", post(mature_position::<S>))
        .route("/deposit-positions/:position_id/close", post(close_position::<S>))
        .route("/interest-accruals", post(accrue_interest::<S>))
        .route("/campaigns", post(create_campaign::<S>))
        .route("/campaigns/:campaign_id/activate", post(activate_campaign::<S>))
        .route("/campaign-enrollments", post(apply_campaign_rate::<S>))
        // Identity
        .route(
            "/verifications",
            post(initiate_verification::<S>).get(list_verifications::<S>),
        )
        .route("/verifications/:verification_id", get(get_verification::<S>))
        .route("/verifications/:verification_id/start", post(start_verification::<S>))
        .route("/verifications/:verification_id/checks", post(complete_check::<S>))
        .route("/verifications/:verification_id/providers", post(assign_provider::<S>))
        // Lending
        .route("/loan-applications", post(submit_loan_application::<S>))
        .route("/loan-applications/:application_id", get(get_loan_application::<S>))
        .route("/loans", post(disburse_loan::<S>))
        .route("/loans/:loan_id", get(get_loan::<S>))
        .route("/loans/:loan_id/payments", post(make_loan_payment::<S>))
}

type Created<T> = AppResult<(StatusCode, Json<T>)>;

// =========================================================================
// Payments
// =========================================================================

async fn initiate_payment<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<InitiatePaymentCommand>,
) -> Created<PaymentView> {
    let order = state.payments.initiate(command, &context).await?;
    Ok((StatusCode::CREATED, Json((&order).into())))
}

async fn process_payment<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(payment_id): ApiPath<Uuid>,
) -> AppResult<Json<PaymentView>> {
    let order = state.payments.process(payment_id, &context).await?;
    Ok(Json((&order).into()))
}

async fn reverse_payment<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(payment_id): ApiPath<Uuid>,
    ApiJson(command): ApiJson<ReversePaymentCommand>,
) -> AppResult<Json<PaymentView>> {
    let order = state.payments.reverse(payment_id, command, &context).await?;
    Ok(Json((&order).into()))
}

async fn get_payment<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(payment_id): ApiPath<Uuid>,
) -> AppResult<Json<PaymentView>> {
    let order = state.payments.get(payment_id, &context).await?;
    Ok(Json((&order).into()))
}

async fn list_payments<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiQuery(query): ApiQuery<ListPaymentsQuery>,
) -> AppResult<Json<PaymentListView>> {
    let page = state.payments.list(query, &context).await?;
    Ok(Json(PaymentListView {
        payments: page.payments.iter().map(PaymentView::from).collect(),
        total_count: page.total_count,
    }))
}

// =========================================================================
// Deposits
// =========================================================================

async fn create_deposit_product<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<CreateDepositProductCommand>,
) -> Created<DepositProductView> {
    let product = state.deposits.create_product(command, &context).await?;
    Ok((StatusCode::CREATED, Json((&product).into())))
}

async fn get_deposit_product<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(product_id): ApiPath<Uuid>,
) -> AppResult<Json<DepositProductView>> {
    let product = state.deposits.get_product(product_id, &context).await?;
    Ok(Json((&product).into()))
}

async fn open_deposit_position<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<OpenDepositPositionCommand>,
) -> Created<PositionView> {
    let position = state.deposits.open_position(command, &context).await?;
    Ok((StatusCode::CREATED, Json((&position).into())))
}

async fn get_deposit_position<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(position_id): ApiPath<Uuid>,
) -> AppResult<Json<PositionView>> {
    let position = state.deposits.get_position(position_id, &context).await?;
    Ok(Json((&position).into()))
}

async fn mature_position<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(position_id): ApiPath<Uuid>,
) -> AppResult<Json<PositionView>> {
    let position = state.deposits.mature_position(position_id, &context).await?;
    Ok(Json((&position).into()))
}

async fn close_position<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(position_id): ApiPath<Uuid>,
) -> AppResult<Json<PositionView>> {
    let position = state.deposits.close_position(position_id, &context).await?;
    Ok(Json((&position).into()))
}

async fn accrue_interest<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<AccrueInterestCommand>,
) -> AppResult<Json<AccrualBatchResult>> {
    Ok(Json(state.deposits.accrue_interest(command, &context).await?))
}

async fn create_campaign<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<CreateCampaignCommand>,
) -> Created<CampaignView> {
    let campaign = state.deposits.create_campaign(command, &context).await?;
    Ok((StatusCode::CREATED, Json((&campaign).into())))
}

async fn activate_campaign<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(campaign_id): ApiPath<Uuid>,
) -> AppResult<Json<CampaignView>> {
    let campaign = state.deposits.activate_campaign(campaign_id, &context).await?;
    Ok(Json((&campaign).into()))
}

async fn apply_campaign_rate<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<ApplyCampaignRateCommand>,
) -> AppResult<Json<CampaignRateView>> {
    let result = state.deposits.apply_campaign_rate(command, &context).await?;
    Ok(Json((&result).into()))
}

// =========================================================================
// Identity
// =========================================================================

async fn initiate_verification<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<InitiateVerificationCommand>,
) -> Created<VerificationView> {
    let verification = state.identity.initiate(command, &context).await?;
    Ok((StatusCode::CREATED, Json((&verification).into())))
}

async fn start_verification<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(verification_id): ApiPath<Uuid>,
) -> AppResult<Json<VerificationView>> {
    let verification = state.identity.start(verification_id, &context).await?;
    Ok(Json((&verification).into()))
}

async fn complete_check<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(verification_id): ApiPath<Uuid>,
    ApiJson(command): ApiJson<CompleteCheckCommand>,
) -> AppResult<Json<VerificationView>> {
    let verification = state
        .identity
        .complete_check(verification_id, command, &context)
        .await?;
    Ok(Json((&verification).into()))
}

async fn assign_provider<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(verification_id): ApiPath<Uuid>,
    ApiJson(command): ApiJson<AssignProviderCommand>,
) -> AppResult<Json<VerificationView>> {
    let verification = state
        .identity
        .assign_provider(verification_id, command, &context)
        .await?;
    Ok(Json((&verification).into()))
}

async fn get_verification<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(verification_id): ApiPath<Uuid>,
) -> AppResult<Json<VerificationView>> {
    let verification = state.identity.get(verification_id, &context).await?;
    Ok(Json((&verification).into()))
}

async fn list_verifications<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
) -> AppResult<Json<Vec<VerificationView>>> {
    let verifications = state.identity.list(&context).await?;
    Ok(Json(verifications.iter().map(VerificationView::from).collect()))
}

// =========================================================================
// Lending
// =========================================================================

async fn submit_loan_application<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<SubmitLoanApplicationCommand>,
) -> Created<LoanApplicationView> {
    let application = state.lending.submit_application(command, &context).await?;
    Ok((StatusCode::CREATED, Json((&application).into())))
}

async fn get_loan_application<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(application_id): ApiPath<Uuid>,
) -> AppResult<Json<LoanApplicationView>> {
    let application = state.lending.get_application(application_id, &context).await?;
    Ok(Json((&application).into()))
}

async fn disburse_loan<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiJson(command): ApiJson<DisburseLoanCommand>,
) -> Created<LoanView> {
    let loan = state.lending.disburse(command, &context).await?;
    Ok((StatusCode::CREATED, Json((&loan).into())))
}

async fn get_loan<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(loan_id): ApiPath<Uuid>,
) -> AppResult<Json<LoanView>> {
    let loan = state.lending.get_loan(loan_id, &context).await?;
    Ok(Json((&loan).into()))
}

async fn make_loan_payment<S: AggregateStore + Clone>(
    State(state): State<AppState<S>>,
    context: CallerContext,
    ApiPath(loan_id): ApiPath<Uuid>,
    ApiJson(command): ApiJson<MakeLoanPaymentCommand>,
) -> AppResult<Json<LoanView>> {
    let loan = state.lending.make_payment(loan_id, command, &context).await?;
    Ok(Json((&loan).into()))
}

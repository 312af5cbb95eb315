//! Command definitions
//!
//! Commands represent intentions to change the system state. Money amounts
//! travel as strings so no precision is lost before they reach `Amount`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Campaign, DepositPosition, PaymentOrder};

// =========================================================================
// Payments
// =========================================================================

/// Command to create a payment order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentCommand {
    pub source_account_id: Uuid,
    /// Set for transfers between accounts held here
    #[serde(default)]
    pub destination_account_id: Option<Uuid>,
    pub amount: String,
    pub currency: String,
    #[serde(default)]
    pub routing_number: String,
    #[serde(default)]
    pub external_account_number: String,
    /// ISO-3166 alpha-2; empty means domestic for the currency
    #[serde(default)]
    pub destination_country: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub description: String,
}

impl InitiatePaymentCommand {
    pub fn internal(
        source_account_id: Uuid,
        destination_account_id: Uuid,
        amount: &str,
        currency: &str,
    ) -> Self {
        Self {
            source_account_id,
            destination_account_id: Some(destination_account_id),
            amount: amount.to_string(),
            currency: currency.to_string(),
            routing_number: String::new(),
            external_account_number: String::new(),
            destination_country: String::new(),
            reference: String::new(),
            description: String::new(),
        }
    }

    pub fn external(
        source_account_id: Uuid,
        amount: &str,
        currency: &str,
        routing_number: &str,
        external_account_number: &str,
        destination_country: &str,
    ) -> Self {
        Self {
            source_account_id,
            destination_account_id: None,
            amount: amount.to_string(),
            currency: currency.to_string(),
            routing_number: routing_number.to_string(),
            external_account_number: external_account_number.to_string(),
            destination_country: destination_country.to_string(),
            reference: String::new(),
            description: String::new(),
        }
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = reference.to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversePaymentCommand {
    pub reason: String,
}

/// Page request for listing payments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListPaymentsQuery {
    /// Only payments debiting this account
    pub account_id: Option<Uuid>,
    /// Defaults to 20, capped at 100
    pub page_size: Option<u32>,
    pub offset: Option<u32>,
}

pub struct PaymentPage {
    pub payments: Vec<PaymentOrder>,
    pub total_count: usize,
}

// =========================================================================
// Deposits
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierInput {
    pub min_balance: Decimal,
    pub max_balance: Decimal,
    pub rate_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDepositProductCommand {
    pub name: String,
    pub currency: String,
    pub tiers: Vec<TierInput>,
    /// Zero for demand deposits
    #[serde(default)]
    pub term_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDepositPositionCommand {
    pub account_id: Uuid,
    pub product_id: Uuid,
    pub principal: String,
    pub currency: String,
}

/// Command to accrue interest on every active position of the tenant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccrueInterestCommand {
    /// Defaults to now
    pub as_of: Option<DateTime<Utc>>,
}

/// Result of an accrual batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualBatchResult {
    pub positions_processed: usize,
    pub total_accrued: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignCommand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub product_id: Uuid,
    pub bonus_rate_bps: u32,
    pub eligibility_criteria: String,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    /// Defaults to ALL
    pub target_audience: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyCampaignRateCommand {
    pub position_id: Uuid,
    pub campaign_id: Uuid,
    /// Defaults to now
    pub as_of: Option<DateTime<Utc>>,
}

/// Result of accruing with a campaign bonus
#[derive(Debug, Clone)]
pub struct CampaignRateResult {
    pub position: DepositPosition,
    pub campaign: Campaign,
    pub bonus_interest: Decimal,
    pub total_interest: Decimal,
    pub standard_rate_bps: u32,
    pub bonus_rate_bps: u32,
    pub effective_rate_bps: u32,
}

// =========================================================================
// Identity
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateVerificationCommand {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteCheckCommand {
    pub check_id: Uuid,
    /// APPROVED, REJECTED or EXPIRED
    pub status: String,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignProviderCommand {
    pub check_id: Uuid,
    pub provider: String,
    pub provider_reference: String,
}

// =========================================================================
// Lending
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitLoanApplicationCommand {
    pub applicant_id: Uuid,
    pub requested_amount: String,
    pub currency: String,
    pub term_months: u32,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisburseLoanCommand {
    pub application_id: Uuid,
    pub borrower_account_id: Uuid,
    /// Overrides the rate suggested at underwriting
    pub interest_rate_bps: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeLoanPaymentCommand {
    pub amount: String,
}

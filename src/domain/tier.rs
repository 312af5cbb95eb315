//! Interest tiers and promotional rates

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DomainError, RateBps};

/// Upper bound on a campaign bonus, 50%.
const MAX_BONUS_BPS: u32 = 5_000;

/// A balance band `[min_balance, max_balance]` paying `rate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestTier {
    min_balance: Decimal,
    max_balance: Decimal,
    rate: RateBps,
}

impl InterestTier {
    pub fn new(
        min_balance: Decimal,
        max_balance: Decimal,
        rate: RateBps,
    ) -> Result<Self, DomainError> {
        if min_balance.is_sign_negative() {
            return Err(DomainError::validation("tier minimum balance must not be negative"));
        }
        if max_balance <= min_balance {
            return Err(DomainError::validation(format!(
                "tier maximum balance ({max_balance}) must be greater than minimum ({min_balance})"
            )));
        }
        Ok(Self {
            min_balance,
            max_balance,
            rate,
        })
    }

    pub fn min_balance(&self) -> Decimal {
        self.min_balance
    }

    pub fn max_balance(&self) -> Decimal {
        self.max_balance
    }

    pub fn rate(&self) -> RateBps {
        self.rate
    }

    /// Inclusive at both ends.
    pub fn applies(&self, balance: Decimal) -> bool {
        balance >= self.min_balance && balance <= self.max_balance
    }
}

/// Sorts tiers by minimum balance and rejects empty or overlapping schedules.
pub fn validate_tiers(mut tiers: Vec<InterestTier>) -> Result<Vec<InterestTier>, DomainError> {
    if tiers.is_empty() {
        return Err(DomainError::validation("at least one interest tier is required"));
    }
    tiers.sort_by(|a, b| a.min_balance.cmp(&b.min_balance));
    for pair in tiers.windows(2) {
        if pair[1].min_balance <= pair[0].max_balance {
            return Err(DomainError::validation(format!(
                "interest tiers overlap: [{}, {}] and [{}, {}]",
                pair[0].min_balance, pair[0].max_balance, pair[1].min_balance, pair[1].max_balance
            )));
        }
    }
    Ok(tiers)
}

/// Campaign bonus on top of the product tier rate, gated by deposit size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionalRate {
    bonus_rate: RateBps,
    eligibility_criteria: String,
    min_deposit: Decimal,
    max_deposit: Decimal,
}

impl PromotionalRate {
    pub fn new(
        bonus_rate: RateBps,
        eligibility_criteria: impl Into<String>,
        min_deposit: Decimal,
        max_deposit: Decimal,
    ) -> Result<Self, DomainError> {
        let eligibility_criteria = eligibility_criteria.into();

        if bonus_rate.bps() == 0 || bonus_rate.bps() > MAX_BONUS_BPS {
            return Err(DomainError::validation(format!(
                "bonus rate must be between 1 and {MAX_BONUS_BPS} bps, got {}",
                bonus_rate.bps()
            )));
        }
        if eligibility_criteria.trim().is_empty() {
            return Err(DomainError::validation("eligibility criteria is required"));
        }
        if min_deposit.is_sign_negative() {
            return Err(DomainError::validation("minimum deposit must not be negative"));
        }
        if max_deposit <= Decimal::ZERO {
            return Err(DomainError::validation("maximum deposit must be positive"));
        }
        if max_deposit <= min_deposit {
            return Err(DomainError::validation(
                "maximum deposit must be greater than minimum deposit",
            ));
        }

        Ok(Self {
            bonus_rate,
            eligibility_criteria,
            min_deposit,
            max_deposit,
        })
    }

    pub fn bonus_rate(&self) -> RateBps {
        self.bonus_rate
    }

    pub fn eligibility_criteria(&self) -> &str {
        &self.eligibility_criteria
    }

    pub fn min_deposit(&self) -> Decimal {
        self.min_deposit
    }

    pub fn max_deposit(&self) -> Decimal {
        self.max_deposit
    }

    /// Inclusive at both ends.
    pub fn is_eligible(&self, amount: Decimal) -> bool {
        amount >= self.min_deposit && amount <= self.max_deposit
    }
}

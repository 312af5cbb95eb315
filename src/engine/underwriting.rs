//! Underwriting Engine
//!
//! Rule-based credit decision from a bureau score and the requested terms.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::RateBps;

/// Longest term any tier will approve.
pub const MAX_TERM_MONTHS: u32 = 360;

/// Lowest score that reaches any approving tier.
pub const MIN_CREDIT_SCORE: u16 = 600;

struct CreditTier {
    min_score: u16,
    reason: &'static str,
    max_amount: i64,
    rate_bps: u32,
}

const TIERS: [CreditTier; 3] = [
    CreditTier {
        min_score: 750,
        reason: "excellent credit tier",
        max_amount: 500_000,
        rate_bps: 450,
    },
    CreditTier {
        min_score: 700,
        reason: "good credit tier",
        max_amount: 250_000,
        rate_bps: 550,
    },
    CreditTier {
        min_score: MIN_CREDIT_SCORE,
        reason: "fair credit tier - elevated rate applies",
        max_amount: 100_000,
        rate_bps: 850,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnderwritingDecision {
    pub approved: bool,
    pub reason: String,
    pub credit_score: u16,
    pub max_amount: Decimal,
    /// Zero when no tier matched
    pub suggested_rate: RateBps,
}

/// Decide a loan request.
///
/// The score picks the tier; the amount and term are then checked against it.
pub fn evaluate(
    credit_score: u16,
    requested_amount: Decimal,
    term_months: u32,
) -> UnderwritingDecision {
    let Some(tier) = TIERS.iter().find(|t| credit_score >= t.min_score) else {
        return UnderwritingDecision {
            approved: false,
            reason: "credit score below minimum threshold".to_string(),
            credit_score,
            max_amount: Decimal::ZERO,
            suggested_rate: RateBps::ZERO,
        };
    };

    let max_amount = Decimal::from(tier.max_amount);
    let (approved, reason) = if requested_amount > max_amount {
        (false, "requested amount exceeds maximum for credit tier")
    } else if term_months > MAX_TERM_MONTHS {
        (false, "term exceeds maximum 360 months")
    } else {
        (true, tier.reason)
    };

    UnderwritingDecision {
        approved,
        reason: reason.to_string(),
        credit_score,
        max_amount,
        suggested_rate: RateBps::new(tier.rate_bps),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tiers() {
        let excellent = evaluate(780, dec!(400000), 360);
        assert!(excellent.approved);
        assert_eq!(excellent.reason, "excellent credit tier");
        assert_eq!(excellent.suggested_rate, RateBps::new(450));

        let good = evaluate(700, dec!(250000), 60);
        assert!(good.approved);
        assert_eq!(good.reason, "good credit tier");
        assert_eq!(good.suggested_rate, RateBps::new(550));

        let fair = evaluate(600, dec!(5000), 12);
        assert!(fair.approved);
        assert_eq!(fair.reason, "fair credit tier - elevated rate applies");
        assert_eq!(fair.max_amount, dec!(100000));
        assert_eq!(fair.suggested_rate, RateBps::new(850));
    }

    #[test]
    fn test_below_minimum_rejected() {
        let decision = evaluate(599, dec!(100), 12);
        assert!(!decision.approved);
        assert!(decision.reason.starts_with("credit score below minimum"));
        assert!(decision.suggested_rate.is_zero());
    }

    #[test]
    fn test_amount_over_tier_limit_rejected() {
        let decision = evaluate(720, dec!(250000.01), 12);
        assert!(!decision.approved);
        assert_eq!(decision.reason, "requested amount exceeds maximum for credit tier");
    }

    #[test]
    fn test_term_limit() {
        let decision = evaluate(800, dec!(1000), 361);
        assert!(!decision.approved);
        assert_eq!(decision.reason, "term exceeds maximum 360 months");
        assert!(evaluate(800, dec!(1000), 360).approved);
    }
}

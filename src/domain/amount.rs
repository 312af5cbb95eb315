//! Money amounts
//!
//! Principal, payment and transfer values. Interest and balances that may be
//! zero are carried as plain `Decimal`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One trillion, the largest principal or payment accepted
const MAX_AMOUNT: Decimal = Decimal::from_parts(3567587328, 232, 0, false, 0);

/// Finest precision accepted on input
const MAX_SCALE: u32 = 8;

/// Strictly positive monetary value, at most 8 significant decimal places
/// and at most one trillion.
///
/// ```
/// use bank_core::domain::Amount;
///
/// let principal: Amount = "10000".parse().unwrap();
/// assert!("0".parse::<Amount>().is_err());
/// # let _ = principal;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        // 1.50000000000 is accepted as 1.5
        let scale = value.normalize().scale();
        if scale > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(scale));
        }
        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }
        Ok(Self(value))
    }

    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::new(Decimal::from(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

/// Round half away from zero, the convention used for every monetary rounding step.
pub fn round_money(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_non_positive_rejected() {
        for value in [Decimal::ZERO, dec!(-0.01), dec!(-100)] {
            assert!(matches!(Amount::new(value), Err(AmountError::NotPositive(_))));
        }
    }

    #[test]
    fn test_scale_limit_ignores_trailing_zeros() {
        assert!(matches!(
            Amount::new(Decimal::new(123456789, 9)),
            Err(AmountError::TooManyDecimals(9))
        ));
        assert_eq!(Amount::new(Decimal::new(1_500_000_000, 9)).unwrap().value(), dec!(1.5));
    }

    #[test]
    fn test_upper_bound_inclusive() {
        assert_eq!(MAX_AMOUNT, dec!(1000000000000));
        assert!(Amount::new(dec!(1000000000000)).is_ok());
        assert!(matches!(Amount::new(dec!(1000000000000.01)), Err(AmountError::Overflow)));
    }

    #[test]
    fn test_parse_trims_and_reports_garbage() {
        let principal: Amount = " 10000.25 ".parse().unwrap();
        assert_eq!(principal.value(), dec!(10000.25));
        assert!(matches!("12abc".parse::<Amount>(), Err(AmountError::ParseError(_))));
    }

    #[test]
    fn test_json_is_a_string() {
        let amount = Amount::new(dec!(42.50)).unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), r#""42.50""#);
        assert!(serde_json::from_str::<Amount>(r#""-1""#).is_err());
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(2.345), 2), dec!(2.35));
        assert_eq!(round_money(dec!(-2.345), 2), dec!(-2.35));
        assert_eq!(round_money(dec!(20.54794520), 4), dec!(20.5479));
    }
}

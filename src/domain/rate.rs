//! Interest rates expressed in basis points

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 10,000 basis points = 100%.
const BPS_BASE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Day-count denominator. Fixed at 365 even in leap years.
const DAYS_PER_YEAR: Decimal = Decimal::from_parts(365, 0, 0, false, 0);

const MONTHS_PER_YEAR: Decimal = Decimal::from_parts(12, 0, 0, false, 0);

/// A non-negative annual rate in basis points (250 = 2.50%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateBps(u32);

impl RateBps {
    pub const ZERO: RateBps = RateBps(0);

    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn bps(&self) -> u32 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `bps / 10000`
    pub fn annual_rate(&self) -> Decimal {
        Decimal::from(self.0) / BPS_BASE
    }

    /// `bps / 10000 / 365`
    pub fn daily_rate(&self) -> Decimal {
        self.annual_rate() / DAYS_PER_YEAR
    }

    /// `bps / 10000 / 12`
    pub fn monthly_rate(&self) -> Decimal {
        self.annual_rate() / MONTHS_PER_YEAR
    }

    pub fn saturating_add(self, other: RateBps) -> RateBps {
        RateBps(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for RateBps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bps", self.0)
    }
}

impl From<u32> for RateBps {
    fn from(bps: u32) -> Self {
        Self(bps)
    }
}

impl TryFrom<i32> for RateBps {
    type Error = super::DomainError;

    fn try_from(bps: i32) -> Result<Self, Self::Error> {
        u32::try_from(bps)
            .map(RateBps)
            .map_err(|_| super::DomainError::validation("rate basis points must not be negative"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_annual_rate() {
        assert_eq!(RateBps::new(250).annual_rate(), dec!(0.025));
        assert_eq!(RateBps::new(500).annual_rate(), dec!(0.05));
    }

    #[test]
    fn test_daily_rate_uses_365_days() {
        assert_eq!(RateBps::new(250).daily_rate(), dec!(0.025) / dec!(365));
        assert!(RateBps::ZERO.daily_rate().is_zero());
    }

    #[test]
    fn test_monthly_rate() {
        assert_eq!(RateBps::new(600).monthly_rate(), dec!(0.005));
    }

    #[test]
    fn test_negative_bps_rejected() {
        assert!(RateBps::try_from(-50).is_err());
        assert_eq!(RateBps::try_from(850).unwrap(), RateBps::new(850));
    }
}

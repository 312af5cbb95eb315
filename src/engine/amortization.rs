//! Amortization Engine
//!
//! Fixed-payment monthly schedule:
//!
//! ```text
//! r       = rate_bps / 10000 / 12
//! payment = P * r * (1+r)^n / ((1+r)^n - 1)
//! ```
//!
//! All arithmetic is exact decimal. Payments and per-period interest are
//! rounded to cents; the final period takes whatever principal remains so
//! the principal column always sums to `P`.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::{round_money, DomainError, RateBps};

/// Currency minor unit used for schedule amounts.
pub const SCHEDULE_SCALE: u32 = 2;

/// One period of an amortization schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmortizationEntry {
    pub period: u32,
    pub due_date: DateTime<Utc>,
    pub principal: Decimal,
    pub interest: Decimal,
    pub total_payment: Decimal,
    pub remaining_balance: Decimal,
}

/// `(1 + r)^n` by repeated multiplication.
fn compound_factor(monthly_rate: Decimal, periods: u32) -> Result<Decimal, DomainError> {
    let base = Decimal::ONE + monthly_rate;
    (0..periods).try_fold(Decimal::ONE, |acc, _| {
        acc.checked_mul(base)
            .ok_or_else(|| DomainError::validation("amortization factor overflow"))
    })
}

/// Level monthly payment, rounded to cents.
pub fn monthly_payment(
    principal: Decimal,
    rate: RateBps,
    term_months: u32,
) -> Result<Decimal, DomainError> {
    if term_months == 0 {
        return Err(DomainError::validation("term months must be positive"));
    }
    let r = rate.monthly_rate();
    if r.is_zero() {
        return Ok(round_money(principal / Decimal::from(term_months), SCHEDULE_SCALE));
    }
    let factor = compound_factor(r, term_months)?;
    let payment = principal * r * factor / (factor - Decimal::ONE);
    Ok(round_money(payment, SCHEDULE_SCALE))
}

/// Build the schedule. Period `k` falls due `k` months after `start`,
/// clamped to the last day of shorter months.
pub fn generate_schedule(
    principal: Decimal,
    rate: RateBps,
    term_months: u32,
    start: DateTime<Utc>,
) -> Result<Vec<AmortizationEntry>, DomainError> {
    if principal <= Decimal::ZERO {
        return Err(DomainError::validation("principal must be positive"));
    }
    if term_months == 0 {
        return Err(DomainError::validation("term months must be positive"));
    }

    let r = rate.monthly_rate();
    let payment = monthly_payment(principal, rate, term_months)?;

    let mut schedule = Vec::with_capacity(term_months as usize);
    let mut remaining = principal;

    for period in 1..=term_months {
        let due_date = start
            .checked_add_months(Months::new(period))
            .ok_or_else(|| DomainError::validation("amortization due date out of range"))?;

        let interest = round_money(remaining * r, SCHEDULE_SCALE);
        let principal_part = if period == term_months {
            remaining
        } else {
            (payment - interest).max(Decimal::ZERO).min(remaining)
        };
        remaining -= principal_part;

        schedule.push(AmortizationEntry {
            period,
            due_date,
            principal: principal_part,
            interest,
            total_payment: principal_part + interest,
            remaining_balance: remaining,
        });
    }

    Ok(schedule)
}

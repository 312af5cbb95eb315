//! Calculation engines
//!
//! Pure, synchronous functions that compute the numeric content of a
//! transition. They hold no state and never touch storage.

pub mod accrual;
pub mod amortization;
pub mod routing;
pub mod underwriting;

pub use accrual::{accrue, accrue_with_campaign, Accrual, CampaignAccrual, EffectiveRate};
pub use amortization::{generate_schedule, monthly_payment, AmortizationEntry};
pub use routing::select_rail;
pub use underwriting::{evaluate, UnderwritingDecision};

//! Domain module
//!
//! Value objects, the event envelope and domain errors.

pub mod account_code;
pub mod amount;
pub mod context;
pub mod currency;
pub mod error;
pub mod events;
pub mod rate;
pub mod routing;
pub mod tier;

pub use account_code::AccountCode;
pub use amount::{round_money, Amount, AmountError};
pub use context::{CallerContext, CallerRole};
pub use currency::Currency;
pub use error::DomainError;
pub use events::{DomainEvent, EventPayload};
pub use rate::RateBps;
pub use routing::RoutingInfo;
pub use tier::{validate_tiers, InterestTier, PromotionalRate};

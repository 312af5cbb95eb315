//! Aggregate module
//!
//! Versioned, immutable aggregate roots. Every transition returns a new
//! instance with `version + 1` and exactly one event appended to its pending
//! list; the repository drains that list when it persists the aggregate.

use uuid::Uuid;

use crate::domain::{DomainEvent, EventPayload};

/// Declares a closed string enumeration stored as text (statuses, rails, ...).
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::domain::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(crate::domain::DomainError::validation(format!(
                        concat!("unknown ", stringify!($name), ": {:?}"),
                        other
                    ))),
                }
            }
        }
    };
}

pub mod campaign;
pub mod deposit_position;
pub mod deposit_product;
pub mod identity_verification;
pub mod loan;
pub mod loan_application;
pub mod payment_order;

pub use campaign::{Campaign, CampaignEvent, CampaignStatus, NewCampaign, TargetAudience};
pub use deposit_position::{days_between, DepositPosition, DepositPositionEvent, PositionStatus};
pub use deposit_product::{DepositProduct, DepositProductEvent};
pub use identity_verification::{
    ApplicantDetails, CheckStatus, CheckType, IdentityVerification, VerificationCheck,
    VerificationEvent, VerificationStatus,
};
pub use loan::{Loan, LoanEvent, LoanStatus, NewLoan};
pub use loan_application::{
    ApplicationStatus, LoanApplication, LoanApplicationEvent, NewLoanApplication,
};
pub use payment_order::{NewPaymentOrder, PaymentEvent, PaymentOrder, PaymentRail, PaymentStatus};

/// Identity and optimistic-concurrency version of an aggregate.
pub trait Versioned {
    fn id(&self) -> Uuid;

    fn tenant_id(&self) -> Uuid;

    /// Starts at 1 and grows by exactly one per successful transition.
    fn version(&self) -> i64;
}

/// Owner of an ordered buffer of events not yet written to the outbox.
pub trait EventSource {
    type Event: EventPayload;

    fn pending_events(&self) -> &[DomainEvent<Self::Event>];

    /// Drop the pending events. Only the repository calls this, after commit.
    fn clear_events(self) -> Self;
}

/// Aggregate trait that all aggregates must implement
pub trait AggregateRoot: Versioned + EventSource + Clone + Send + Sync + 'static {
    /// Aggregate type name used in events, outbox rows and topics
    const AGGREGATE_TYPE: &'static str;

    /// Version of the stored row this instance was derived from.
    ///
    /// Each pending event accounts for one version increment since load, so
    /// a freshly created aggregate yields 0 and has no stored predecessor.
    fn expected_prior_version(&self) -> i64 {
        self.version() - self.pending_events().len() as i64
    }
}

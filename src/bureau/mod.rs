//! Credit bureau collaborator
//!
//! Underwriting asks the bureau for a score under the caller's deadline.
//! A [`BureauTransport`] is one raw call; [`RetryingBureau`] turns it into a
//! [`CreditBureauClient`] with bounded retries.

mod retry;
mod stub;

pub use retry::{RetryConfig, RetryingBureau};
pub use stub::StubBureau;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use uuid::Uuid;

/// Lowest score a bureau reports
pub const MIN_SCORE: u16 = 300;
/// Highest score a bureau reports
pub const MAX_SCORE: u16 = 850;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BureauError {
    /// Transient failure; worth another attempt
    #[error("credit bureau unavailable: {0}")]
    Unavailable(String),

    #[error("invalid credit bureau response: {0}")]
    InvalidResponse(String),

    #[error("deadline exceeded waiting for credit bureau")]
    DeadlineExceeded,

    #[error("credit bureau failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("validation failed: {0}")]
    Validation(String),
}

impl BureauError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BureauError::Unavailable(_))
    }
}

/// Score lookup as seen by use cases
#[async_trait]
pub trait CreditBureauClient: Send + Sync {
    /// Score in `MIN_SCORE..=MAX_SCORE`. Never waits past `deadline`.
    async fn get_credit_score(
        &self,
        applicant_id: Uuid,
        deadline: Instant,
    ) -> Result<u16, BureauError>;
}

#[async_trait]
impl<T: CreditBureauClient + ?Sized> CreditBureauClient for Arc<T> {
    async fn get_credit_score(
        &self,
        applicant_id: Uuid,
        deadline: Instant,
    ) -> Result<u16, BureauError> {
        (**self).get_credit_score(applicant_id, deadline).await
    }
}

/// A single, unretried request to a bureau
#[async_trait]
pub trait BureauTransport: Send + Sync {
    async fn fetch_score(&self, applicant_id: Uuid) -> Result<u16, BureauError>;
}

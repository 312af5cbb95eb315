//! Command Handlers module
//!
//! Use cases that load aggregates, drive their transitions and save them.
//! One handler per service; all of them are generic over the store.

mod commands;
mod deposit_handler;
mod identity_handler;
mod lending_handler;
mod payment_handler;

pub use commands::*;
pub use deposit_handler::DepositHandler;
pub use identity_handler::IdentityHandler;
pub use lending_handler::LendingHandler;
pub use payment_handler::{AcceptingRail, PaymentHandler, RailAdapter, RailError};

use std::future::Future;
use std::time::Duration;

use crate::domain::{Amount, CallerContext, Currency, DomainError};
use crate::error::{AppError, AppResult};

/// Default attempts for a use case whose save hits a concurrency conflict
pub const DEFAULT_SAVE_ATTEMPTS: u32 = 3;

/// Run `operation` again from a fresh load when its save loses a version race.
///
/// Backoff between attempts grows linearly (50ms, 100ms, ...). Any other
/// error, or a conflict on the last attempt, is returned as is.
pub async fn with_conflict_retry<T, F, Fut>(max_attempts: u32, mut operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    "Concurrency conflict, retrying (attempt {}/{})",
                    attempt,
                    max_attempts
                );
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Reject read-only callers on mutating use cases
pub fn authorize_mutation(context: &CallerContext) -> AppResult<()> {
    if context.role.can_mutate() {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(format!(
            "role {} cannot perform mutations",
            context.role
        )))
    }
}

pub(crate) fn parse_amount(raw: &str) -> AppResult<Amount> {
    raw.trim()
        .parse::<Amount>()
        .map_err(|e| AppError::Domain(DomainError::from(e)))
}

pub(crate) fn parse_currency(raw: &str) -> AppResult<Currency> {
    Ok(raw.trim().parse::<Currency>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CallerRole;
    use crate::outbox::RepositoryError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn conflict() -> AppError {
        RepositoryError::ConcurrencyConflict {
            aggregate_type: "payment_order",
            aggregate_id: Uuid::new_v4(),
            expected_version: 1,
        }
        .into()
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_conflict() {
        let calls = AtomicU32::new(0);
        let result = with_conflict_retry(3, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(conflict())
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_conflict_retry(2, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_conflict_not_retried() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_conflict_retry(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Domain(DomainError::validation("bad")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_viewer_cannot_mutate() {
        let viewer = CallerContext::new(Uuid::new_v4(), CallerRole::Viewer);
        let operator = CallerContext::new(Uuid::new_v4(), CallerRole::Operator);

        assert!(matches!(authorize_mutation(&viewer), Err(AppError::PermissionDenied(_))));
        assert!(authorize_mutation(&operator).is_ok());
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_amount(" 100.50 ").unwrap().to_string(), "100.50");
        assert!(matches!(parse_amount("-5"), Err(AppError::Domain(e)) if e.is_validation()));
        assert_eq!(parse_currency(" EUR ").unwrap(), Currency::EUR);
        assert!(parse_currency("usd").is_err());
    }
}

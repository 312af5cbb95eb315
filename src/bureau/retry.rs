//! Bounded exponential backoff with jitter
//!
//! Retry k waits `backoff * 2^(k-1)` plus up to half that again at random.
//! A wait that would end past the deadline is not started.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::{sleep, timeout_at, Instant};
use uuid::Uuid;

use super::{BureauError, BureauTransport, CreditBureauClient, MAX_SCORE, MIN_SCORE};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryConfig {
    /// Base delay before retry `retry` (1-based), without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }

    fn delay_with_jitter(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        let half_ms = (base.as_millis() / 2) as u64;
        if half_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..half_ms))
    }
}

/// Credit bureau client that retries transient transport failures
#[derive(Debug, Clone)]
pub struct RetryingBureau<T> {
    transport: T,
    config: RetryConfig,
}

impl<T: BureauTransport> RetryingBureau<T> {
    pub fn new(transport: T, config: RetryConfig) -> Self {
        Self { transport, config }
    }
}

fn check_range(score: u16) -> Result<u16, BureauError> {
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(score)
    } else {
        Err(BureauError::InvalidResponse(format!(
            "score {score} outside {MIN_SCORE}..={MAX_SCORE}"
        )))
    }
}

#[async_trait]
impl<T: BureauTransport> CreditBureauClient for RetryingBureau<T> {
    async fn get_credit_score(
        &self,
        applicant_id: Uuid,
        deadline: Instant,
    ) -> Result<u16, BureauError> {
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                let delay = self.config.delay_with_jitter(attempt - 1);
                if Instant::now() + delay >= deadline {
                    tracing::warn!(
                        applicant_id = %applicant_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Deadline reached before next credit bureau retry"
                    );
                    return Err(BureauError::DeadlineExceeded);
                }
                sleep(delay).await;
            }

            match timeout_at(deadline, self.transport.fetch_score(applicant_id)).await {
                Err(_) => {
                    tracing::warn!(
                        applicant_id = %applicant_id,
                        attempt,
                        "Credit bureau call hit deadline"
                    );
                    return Err(BureauError::DeadlineExceeded);
                }
                Ok(Ok(score)) => {
                    if attempt > 1 {
                        tracing::info!(
                            applicant_id = %applicant_id,
                            attempt,
                            "Credit bureau succeeded after retry"
                        );
                    }
                    return check_range(score);
                }
                Ok(Err(error)) if error.is_transient() => {
                    tracing::warn!(
                        applicant_id = %applicant_id,
                        attempt,
                        max_attempts = attempts,
                        error = %error,
                        "Credit bureau call failed"
                    );
                    last_error = Some(error);
                }
                Ok(Err(error)) => return Err(error),
            }
        }

        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        tracing::error!(
            applicant_id = %applicant_id,
            attempts,
            error = %last_error,
            "Credit bureau failed after all retries"
        );
        Err(BureauError::Exhausted { attempts, last_error })
    }
}

//! Deterministic stand-in bureau

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{BureauError, BureauTransport, MAX_SCORE, MIN_SCORE};

/// Derives a stable score from the applicant id so the same applicant always
/// lands in the same credit tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubBureau;

impl StubBureau {
    pub fn score_for(applicant_id: Uuid) -> Result<u16, BureauError> {
        if applicant_id.is_nil() {
            return Err(BureauError::Validation("applicant ID is required".into()));
        }
        let digest = Sha256::digest(applicant_id.as_bytes());
        let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let span = u32::from(MAX_SCORE - MIN_SCORE) + 1;
        // Below 551, so the cast cannot truncate
        Ok(MIN_SCORE + (prefix % span) as u16)
    }
}

#[async_trait]
impl BureauTransport for StubBureau {
    async fn fetch_score(&self, applicant_id: Uuid) -> Result<u16, BureauError> {
        Self::score_for(applicant_id)
    }
}

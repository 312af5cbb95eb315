//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::AmountError;

/// Business rule violations and invariant failures raised by value objects,
/// aggregates and calculation engines.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Bad input, rejected before any state change
    #[error("validation failed: {0}")]
    Validation(String),

    /// State machine rule violated
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// No interest tier covers the balance
    #[error("no applicable interest tier for balance {0}")]
    NoApplicableTier(Decimal),

    /// Business rule violation (ineligible campaign, payment above balance, ...)
    #[error("business rule violation: {0}")]
    BusinessRuleViolation(String),

    #[error(transparent)]
    Amount(#[from] AmountError),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::BusinessRuleViolation(msg.into())
    }

    /// Bad input as opposed to a request that is well-formed but not allowed
    /// in the aggregate's current state.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Amount(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = DomainError::validation("tenant_id is required");

        assert!(err.is_validation());
        assert!(err.to_string().contains("tenant_id is required"));
    }

    #[test]
    fn test_invalid_transition_is_not_validation() {
        let err = DomainError::invalid_transition("can only settle from PROCESSING status");

        assert!(!err.is_validation());
        assert!(err.to_string().contains("PROCESSING"));
    }

    #[test]
    fn test_amount_error_converts() {
        let err: DomainError = AmountError::Overflow.into();
        assert!(err.is_validation());
    }
}

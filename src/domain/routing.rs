//! External routing details for a payment

use serde::{Deserialize, Serialize};

use super::DomainError;

/// ABA routing number plus the external account it addresses.
///
/// Empty routing info is valid and means the payment stays on internal rails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingInfo {
    routing_number: String,
    external_account_number: String,
}

impl RoutingInfo {
    pub fn new(routing_number: &str, external_account_number: &str) -> Result<Self, DomainError> {
        let routing_number = routing_number.trim();
        let external_account_number = external_account_number.trim();

        if routing_number.is_empty() && external_account_number.is_empty() {
            return Ok(Self::default());
        }

        if !routing_number.is_empty()
            && (routing_number.len() != 9 || !routing_number.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(DomainError::validation(format!(
                "routing number must be exactly 9 digits, got: {:?}",
                routing_number
            )));
        }

        if !routing_number.is_empty() && external_account_number.is_empty() {
            return Err(DomainError::validation(
                "external account number is required when routing number is provided",
            ));
        }

        Ok(Self {
            routing_number: routing_number.to_string(),
            external_account_number: external_account_number.to_string(),
        })
    }

    pub fn routing_number(&self) -> &str {
        &self.routing_number
    }

    pub fn external_account_number(&self) -> &str {
        &self.external_account_number
    }

    pub fn is_empty(&self) -> bool {
        self.routing_number.is_empty() && self.external_account_number.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_routing_is_internal() {
        let info = RoutingInfo::new("", "").unwrap();
        assert!(info.is_empty());
    }

    #[test]
    fn test_valid_routing() {
        let info = RoutingInfo::new("021000021", "123456789012").unwrap();
        assert_eq!(info.routing_number(), "021000021");
        assert_eq!(info.external_account_number(), "123456789012");
        assert!(!info.is_empty());
    }

    #[test]
    fn test_routing_number_must_be_nine_digits() {
        let err = RoutingInfo::new("12345", "999").unwrap_err();
        assert!(err.to_string().contains("exactly 9 digits"));
        assert!(RoutingInfo::new("02100002A", "999").is_err());
    }

    #[test]
    fn test_routing_number_requires_account() {
        let err = RoutingInfo::new("021000021", "").unwrap_err();
        assert!(err.to_string().contains("external account number is required"));
    }
}

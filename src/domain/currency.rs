//! ISO-4217 currency codes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Three upper-case ASCII letters, e.g. `USD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    pub const USD: Currency = Currency(*b"USD");
    pub const EUR: Currency = Currency(*b"EUR");

    pub fn new(code: &str) -> Result<Self, DomainError> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter ISO code, got: {:?}",
                code
            )));
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn code(&self) -> &str {
        // Constructed only from ASCII upper-case letters
        std::str::from_utf8(&self.0).unwrap_or("XXX")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_valid() {
        let usd = Currency::new("USD").unwrap();
        assert_eq!(usd, Currency::USD);
        assert_eq!(usd.to_string(), "USD");
    }

    #[test]
    fn test_currency_rejects_malformed() {
        for bad in ["usd", "US", "USDX", "", "U$D", "ÜSD"] {
            assert!(Currency::new(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_currency_serde() {
        let json = serde_json::to_string(&Currency::EUR).unwrap();
        assert_eq!(json, r#""EUR""#);
        let parsed: Result<Currency, _> = serde_json::from_str(r#""eur""#);
        assert!(parsed.is_err());
    }
}

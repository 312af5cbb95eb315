//! General ledger account codes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// A ledger account code of the form `NNNN` or `NNNN-NNN` (e.g. `1000-001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountCode(String);

impl AccountCode {
    pub fn new(code: &str) -> Result<Self, DomainError> {
        if !Self::is_well_formed(code) {
            return Err(DomainError::validation(format!(
                "invalid account code {:?}: must match pattern NNNN or NNNN-NNN",
                code
            )));
        }
        Ok(Self(code.to_string()))
    }

    fn is_well_formed(code: &str) -> bool {
        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        match code.split_once('-') {
            None => code.len() == 4 && all_digits(code),
            Some((head, tail)) => {
                head.len() == 4 && tail.len() == 3 && all_digits(head) && all_digits(tail)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The four-digit parent account (`1000` for `1000-001`).
    pub fn parent(&self) -> &str {
        &self.0[..4]
    }
}

impl fmt::Display for AccountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountCode::new(s)
    }
}

impl TryFrom<String> for AccountCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountCode::new(&value)
    }
}

impl From<AccountCode> for String {
    fn from(code: AccountCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_code_valid() {
        assert_eq!(AccountCode::new("1000").unwrap().as_str(), "1000");
        let sub = AccountCode::new("2100-001").unwrap();
        assert_eq!(sub.parent(), "2100");
    }

    #[test]
    fn test_account_code_invalid() {
        for bad in ["100", "10000", "1000-01", "1000-0001", "ABCD", "1000_001", "1000-", ""] {
            assert!(AccountCode::new(bad).is_err(), "{bad} should be rejected");
        }
    }
}

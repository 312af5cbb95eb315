//! Caller Context
//!
//! Who is calling, on behalf of which tenant, and with what role.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role granted to the caller by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    Admin,
    Operator,
    Viewer,
}

impl CallerRole {
    /// Viewers are read-only.
    pub fn can_mutate(&self) -> bool {
        !matches!(self, CallerRole::Viewer)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallerRole::Admin => "admin",
            CallerRole::Operator => "operator",
            CallerRole::Viewer => "viewer",
        }
    }
}

impl fmt::Display for CallerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(CallerRole::Admin),
            "operator" => Ok(CallerRole::Operator),
            "viewer" => Ok(CallerRole::Viewer),
            other => Err(format!("unknown caller role: {other}")),
        }
    }
}

/// Context for an operation, used for tenant scoping and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerContext {
    pub tenant_id: Uuid,
    pub role: CallerRole,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl CallerContext {
    pub fn new(tenant_id: Uuid, role: CallerRole) -> Self {
        Self {
            tenant_id,
            role,
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

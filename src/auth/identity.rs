//! Identity records and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

/// Coarse authorization tag attached to every identity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Default role for every identity registered after the first one.
    Standard,
    /// Administrative role; granted to the first identity ever registered.
    Privileged,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Privileged => "privileged",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "privileged" => Ok(Self::Privileged),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A registered account as seen outside the credential store.
///
/// Carries no secret hash; only [`StoredIdentity`] does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub handle: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    #[must_use]
    pub fn is_privileged(&self) -> bool {
        self.role == Role::Privileged
    }
}

/// Identity plus its secret hash, returned only for credential checks.
#[derive(Clone)]
pub struct StoredIdentity {
    pub identity: Identity,
    pub secret_hash: String,
}

impl fmt::Debug for StoredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredIdentity")
            .field("identity", &self.identity)
            .field("secret_hash", &"[REDACTED]")
            .finish()
    }
}

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{Identity, Role};

#[derive(Deserialize, ToSchema)]
pub struct CredentialsRequest {
    pub handle: String,
    #[schema(format = Password)]
    pub secret: String,
}

impl CredentialsRequest {
    /// Split into the handle and a zeroize-on-drop secret.
    pub(crate) fn into_parts(self) -> (String, SecretString) {
        (self.handle, SecretString::from(self.secret))
    }
}

impl std::fmt::Debug for CredentialsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsRequest")
            .field("handle", &self.handle)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    /// `standard` or `privileged`.
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResponse {
    pub id: String,
    pub handle: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<Identity> for IdentityResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            handle: identity.handle,
            role: identity.role,
            created_at: identity.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub id: String,
    pub handle: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

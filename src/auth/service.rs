//! Register / login / logout orchestration.
//!
//! Flow Overview:
//! - register: validate, hash outside any lock, then check-handle, count and
//!   create under the directory lock so only the first identity ever created
//!   can become privileged.
//! - login: unknown handle and wrong secret fail identically (both pay for one
//!   hash verification), then the session store issues a fresh token.
//! - role changes also take the directory lock so the last privileged identity
//!   can never be demoted by two racing requests.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{
    credentials::CredentialStore,
    error::AuthError,
    hasher::SecretHasher,
    identity::{Identity, Role},
    sessions::SessionStore,
};

const MAX_HANDLE_LEN: usize = 254;
const MAX_SECRET_LEN: usize = 1024;

static HANDLE_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Trim surrounding whitespace; comparison stays case-sensitive.
pub(crate) fn normalize_handle(handle: &str) -> &str {
    handle.trim()
}

/// Basic email-shaped check on an already-normalized handle.
pub(crate) fn valid_handle(handle: &str) -> bool {
    handle.len() <= MAX_HANDLE_LEN
        && HANDLE_PATTERN
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(handle))
}

fn valid_secret(secret: &str) -> bool {
    !secret.is_empty() && secret.len() <= MAX_SECRET_LEN
}

/// Result of a successful login: the identity and its fresh session token.
#[derive(Debug)]
pub struct LoginOutcome {
    pub identity: Identity,
    pub token: String,
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    hasher: SecretHasher,
    // Serializes bootstrap role assignment and role changes.
    directory_lock: Mutex<()>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        hasher: SecretHasher,
    ) -> Self {
        Self {
            credentials,
            sessions,
            hasher,
            directory_lock: Mutex::new(()),
        }
    }

    /// Register a new identity; the first one ever created is privileged.
    ///
    /// # Errors
    /// `InvalidInput` for malformed input, `DuplicateHandle` when taken,
    /// `Storage` on backend failures.
    #[instrument(skip(self, secret))]
    pub async fn register(
        &self,
        handle: &str,
        secret: &SecretString,
    ) -> Result<Identity, AuthError> {
        let handle = normalize_handle(handle);
        if !valid_handle(handle) {
            return Err(AuthError::InvalidInput("handle must be an email address"));
        }
        if !valid_secret(secret.expose_secret()) {
            return Err(AuthError::InvalidInput("secret must be 1 to 1024 bytes"));
        }

        // Hashing is slow; keep it out of the critical section.
        let secret_hash = self.hash_secret(secret).await?;

        let _directory = self.directory_lock.lock().await;
        if self.credentials.find_by_handle(handle).await?.is_some() {
            debug!("registration rejected: handle taken");
            return Err(AuthError::DuplicateHandle);
        }
        let role = if self.credentials.count().await? == 0 {
            Role::Privileged
        } else {
            Role::Standard
        };
        let identity = self.credentials.create(handle, &secret_hash, role).await?;

        info!(identity_id = %identity.id, role = %identity.role, "identity registered");
        Ok(identity)
    }

    /// Verify credentials and open a session, replacing any previous one.
    ///
    /// # Errors
    /// `InvalidCredentials` for unknown handles and wrong secrets alike.
    #[instrument(skip(self, secret))]
    pub async fn login(
        &self,
        handle: &str,
        secret: &SecretString,
    ) -> Result<LoginOutcome, AuthError> {
        let handle = normalize_handle(handle);
        let stored = self.credentials.find_credentials(handle).await?;

        let hasher = self.hasher.clone();
        let candidate = SecretString::from(secret.expose_secret().to_owned());
        let (identity, verified) = match stored {
            Some(stored) => {
                let secret_hash = stored.secret_hash;
                let verified = tokio::task::spawn_blocking(move || {
                    hasher.verify(candidate.expose_secret(), &secret_hash)
                })
                .await
                .context("secret verification task failed")
                .map_err(AuthError::Storage)?;
                (Some(stored.identity), verified)
            }
            None => {
                tokio::task::spawn_blocking(move || hasher.dummy_verify(candidate.expose_secret()))
                    .await
                    .context("secret verification task failed")
                    .map_err(AuthError::Storage)?;
                (None, false)
            }
        };

        let Some(identity) = identity.filter(|_| verified) else {
            debug!("login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        let token = self.sessions.create(identity.id).await?;
        info!(identity_id = %identity.id, "session opened");
        Ok(LoginOutcome { identity, token })
    }

    /// Close a session. Unknown or already-closed tokens succeed.
    ///
    /// # Errors
    /// `Storage` on backend failures.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.destroy(token).await?;
        Ok(())
    }

    /// Close every session owned by an identity.
    ///
    /// # Errors
    /// `Storage` on backend failures.
    pub async fn logout_everywhere(&self, identity_id: Uuid) -> Result<(), AuthError> {
        self.sessions.destroy_all_for_identity(identity_id).await?;
        info!(%identity_id, "all sessions closed");
        Ok(())
    }

    /// Resolve a token to its identity; `None` if the session or identity is gone.
    ///
    /// # Errors
    /// `Storage` on backend failures.
    pub async fn resolve_session(&self, token: &str) -> Result<Option<Identity>, AuthError> {
        let Some(identity_id) = self.sessions.resolve(token).await? else {
            return Ok(None);
        };
        Ok(self.credentials.find_by_id(identity_id).await?)
    }

    /// # Errors
    /// `Storage` on backend failures.
    pub async fn list_identities(&self) -> Result<Vec<Identity>, AuthError> {
        Ok(self.credentials.list().await?)
    }

    /// Change another (or the same) identity's role on behalf of `actor`.
    ///
    /// Demoting the last privileged identity is refused.
    ///
    /// # Errors
    /// `InsufficientPermissions` if `actor` is not privileged, `NotFound` for
    /// unknown targets, `LastPrivileged` for the lock-out case.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    pub async fn set_role(
        &self,
        actor: &Identity,
        target_id: Uuid,
        role: Role,
    ) -> Result<Identity, AuthError> {
        if !actor.is_privileged() {
            return Err(AuthError::InsufficientPermissions);
        }

        let _directory = self.directory_lock.lock().await;
        let target = self
            .credentials
            .find_by_id(target_id)
            .await?
            .ok_or(AuthError::NotFound)?;

        if target.role == role {
            return Ok(target);
        }
        if target.role == Role::Privileged
            && self.credentials.count_role(Role::Privileged).await? <= 1
        {
            return Err(AuthError::LastPrivileged);
        }

        let updated = self.credentials.update_role(target_id, role).await?;
        info!(
            target_id = %updated.id,
            previous_role = %target.role,
            role = %updated.role,
            "role changed"
        );
        Ok(updated)
    }

    /// # Errors
    /// `Storage` on backend failures.
    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        Ok(self.sessions.purge_expired().await?)
    }

    /// # Errors
    /// `Storage` when the credential backend is unreachable.
    pub async fn ping(&self) -> Result<(), AuthError> {
        Ok(self.credentials.ping().await?)
    }

    async fn hash_secret(&self, secret: &SecretString) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let secret = SecretString::from(secret.expose_secret().to_owned());
        tokio::task::spawn_blocking(move || hasher.hash(secret.expose_secret()))
            .await
            .context("secret hashing task failed")
            .and_then(|result| result)
            .map_err(AuthError::Storage)
    }
}

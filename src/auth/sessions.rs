//! Session store: opaque token → identity, one live session per identity.
//!
//! Flow Overview:
//! - `create` drops whatever session the identity already has and inserts the
//!   new one in the same critical section.
//! - `resolve` treats `now >= expires_at` as absent and purges the record.
//! - Only the SHA-256 digest of a token is kept; the raw token goes back to the
//!   caller once, for the cookie.

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{
    clock::Clock,
    error::StoreError,
    token::{generate_session_token, hash_session_token},
};

// Attempts before giving up on a colliding token.
const TOKEN_ATTEMPTS: usize = 3;

/// `created_at + ttl`, or a backend error when the sum leaves chrono's range.
pub(crate) fn session_expiry(
    created_at: DateTime<Utc>,
    ttl: TimeDelta,
) -> Result<DateTime<Utc>, StoreError> {
    created_at
        .checked_add_signed(ttl)
        .ok_or_else(|| StoreError::Backend(anyhow!("session expiry out of range")))
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Issue a token for `identity_id`, invalidating any session it already has.
    async fn create(&self, identity_id: Uuid) -> Result<String, StoreError>;

    /// Owning identity of a live token; `None` when unknown or expired.
    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, StoreError>;

    /// Remove a token. Unknown tokens are not an error.
    async fn destroy(&self, token: &str) -> Result<(), StoreError>;

    async fn destroy_all_for_identity(&self, identity_id: Uuid) -> Result<(), StoreError>;

    /// Drop every expired record and return how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

#[derive(Clone, Debug)]
struct SessionRecord {
    identity_id: Uuid,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct SessionTable {
    by_hash: HashMap<Vec<u8>, SessionRecord>,
    by_identity: HashMap<Uuid, Vec<u8>>,
}

impl SessionTable {
    fn remove_hash(&mut self, token_hash: &[u8]) -> Option<SessionRecord> {
        let record = self.by_hash.remove(token_hash)?;
        if self
            .by_identity
            .get(&record.identity_id)
            .is_some_and(|current| current.as_slice() == token_hash)
        {
            self.by_identity.remove(&record.identity_id);
        }
        Some(record)
    }

    fn remove_identity(&mut self, identity_id: Uuid) {
        if let Some(token_hash) = self.by_identity.remove(&identity_id) {
            self.by_hash.remove(&token_hash);
        }
    }
}

/// In-process session store guarded by a single mutex over both indexes.
pub struct MemorySessionStore {
    table: Mutex<SessionTable>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(SessionTable::default()),
            ttl,
            clock,
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, identity_id: Uuid) -> Result<String, StoreError> {
        let mut table = self.table.lock().await;

        let mut issued = None;
        for _ in 0..TOKEN_ATTEMPTS {
            let token = generate_session_token()?;
            let token_hash = hash_session_token(&token);
            if !table.by_hash.contains_key(&token_hash) {
                issued = Some((token, token_hash));
                break;
            }
        }
        let (token, token_hash) =
            issued.ok_or_else(|| anyhow!("failed to generate unique session token"))?;

        let created_at = self.clock.now();
        let expires_at = session_expiry(created_at, self.ttl)?;

        table.remove_identity(identity_id);
        table.by_hash.insert(
            token_hash.clone(),
            SessionRecord {
                identity_id,
                created_at,
                expires_at,
            },
        );
        table.by_identity.insert(identity_id, token_hash);

        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        let token_hash = hash_session_token(token);
        let mut table = self.table.lock().await;
        let Some(record) = table.by_hash.get(&token_hash) else {
            return Ok(None);
        };

        if self.clock.now() >= record.expires_at {
            let identity_id = record.identity_id;
            table.remove_hash(&token_hash);
            debug!(%identity_id, "purged expired session on read");
            return Ok(None);
        }

        Ok(Some(record.identity_id))
    }

    async fn destroy(&self, token: &str) -> Result<(), StoreError> {
        let token_hash = hash_session_token(token);
        self.table.lock().await.remove_hash(&token_hash);
        Ok(())
    }

    async fn destroy_all_for_identity(&self, identity_id: Uuid) -> Result<(), StoreError> {
        self.table.lock().await.remove_identity(identity_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut table = self.table.lock().await;
        let expired: Vec<Vec<u8>> = table
            .by_hash
            .iter()
            .filter(|(_, record)| now >= record.expires_at)
            .map(|(hash, _)| hash.clone())
            .collect();
        for token_hash in &expired {
            table.remove_hash(token_hash);
        }
        Ok(expired.len() as u64)
    }
}

//! Credential store: identity records keyed by id with a unique handle index.

use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    clock::Clock,
    error::StoreError,
    identity::{Identity, Role, StoredIdentity},
};

/// Persistence contract for identities.
///
/// Implementations enforce handle uniqueness themselves; callers that need
/// check-then-create semantics (bootstrap role assignment) serialize above
/// this layer.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new identity. Fails with [`StoreError::DuplicateHandle`].
    async fn create(
        &self,
        handle: &str,
        secret_hash: &str,
        role: Role,
    ) -> Result<Identity, StoreError>;

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Identity>, StoreError>;

    /// Same lookup as [`CredentialStore::find_by_handle`], including the secret hash.
    async fn find_credentials(&self, handle: &str) -> Result<Option<StoredIdentity>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Total identities ever created; never decreases.
    async fn count(&self) -> Result<u64, StoreError>;

    async fn count_role(&self, role: Role) -> Result<u64, StoreError>;

    /// Change the role of an identity. Fails with [`StoreError::NotFound`].
    async fn update_role(&self, id: Uuid, role: Role) -> Result<Identity, StoreError>;

    /// All identities, oldest first.
    async fn list(&self) -> Result<Vec<Identity>, StoreError>;

    /// Storage liveness check for `/health`.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
struct Directory {
    by_id: HashMap<Uuid, StoredIdentity>,
    by_handle: HashMap<String, Uuid>,
    // Insertion order backs `list`.
    order: Vec<Uuid>,
    created: u64,
}

/// In-process credential store.
pub struct MemoryCredentialStore {
    directory: Mutex<Directory>,
    clock: Arc<dyn Clock>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: Mutex::new(Directory::default()),
            clock,
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create(
        &self,
        handle: &str,
        secret_hash: &str,
        role: Role,
    ) -> Result<Identity, StoreError> {
        let mut directory = self.directory.lock().await;
        if directory.by_handle.contains_key(handle) {
            return Err(StoreError::DuplicateHandle);
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            handle: handle.to_string(),
            role,
            created_at: self.clock.now(),
        };
        directory.by_handle.insert(identity.handle.clone(), identity.id);
        directory.order.push(identity.id);
        directory.by_id.insert(
            identity.id,
            StoredIdentity {
                identity: identity.clone(),
                secret_hash: secret_hash.to_string(),
            },
        );
        directory.created += 1;

        Ok(identity)
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .find_credentials(handle)
            .await?
            .map(|stored| stored.identity))
    }

    async fn find_credentials(&self, handle: &str) -> Result<Option<StoredIdentity>, StoreError> {
        let directory = self.directory.lock().await;
        Ok(directory
            .by_handle
            .get(handle)
            .and_then(|id| directory.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let directory = self.directory.lock().await;
        Ok(directory.by_id.get(&id).map(|stored| stored.identity.clone()))
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.directory.lock().await.created)
    }

    async fn count_role(&self, role: Role) -> Result<u64, StoreError> {
        let directory = self.directory.lock().await;
        let count = directory
            .by_id
            .values()
            .filter(|stored| stored.identity.role == role)
            .count();
        Ok(count as u64)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Identity, StoreError> {
        let mut directory = self.directory.lock().await;
        let stored = directory.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        stored.identity.role = role;
        Ok(stored.identity.clone())
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let directory = self.directory.lock().await;
        Ok(directory
            .order
            .iter()
            .filter_map(|id| directory.by_id.get(id))
            .map(|stored| stored.identity.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::SystemClock;
    use anyhow::Result;

    fn store() -> MemoryCredentialStore {
        MemoryCredentialStore::new(Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn create_rejects_duplicate_handle() -> Result<()> {
        let store = store();
        store.create("a@x.com", "hash", Role::Privileged).await?;
        let second = store.create("a@x.com", "other", Role::Standard).await;
        assert!(matches!(second, Err(StoreError::DuplicateHandle)));
        assert_eq!(store.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn handles_match_exactly() -> Result<()> {
        let store = store();
        store.create("a@x.com", "hash", Role::Standard).await?;
        assert!(store.find_by_handle("A@X.COM").await?.is_none());
        assert!(store.find_by_handle("a@x.com").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn lookups_by_handle_and_id_agree() -> Result<()> {
        let store = store();
        let created = store.create("a@x.com", "hash", Role::Standard).await?;
        let by_id = store.find_by_id(created.id).await?;
        let by_handle = store.find_by_handle("a@x.com").await?;
        assert_eq!(by_id.as_ref(), Some(&created));
        assert_eq!(by_handle.as_ref(), Some(&created));

        let stored = store.find_credentials("a@x.com").await?;
        assert_eq!(stored.map(|s| s.secret_hash), Some("hash".to_string()));
        assert!(store.find_by_id(Uuid::new_v4()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_role_changes_only_role() -> Result<()> {
        let store = store();
        let created = store.create("b@x.com", "hash", Role::Standard).await?;
        let updated = store.update_role(created.id, Role::Privileged).await?;
        assert_eq!(updated.role, Role::Privileged);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.handle, created.handle);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(store.count_role(Role::Privileged).await?, 1);

        let missing = store.update_role(Uuid::new_v4(), Role::Standard).await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn list_keeps_creation_order() -> Result<()> {
        let store = store();
        for handle in ["c@x.com", "a@x.com", "b@x.com"] {
            store.create(handle, "hash", Role::Standard).await?;
        }
        let handles: Vec<String> = store
            .list()
            .await?
            .into_iter()
            .map(|identity| identity.handle)
            .collect();
        assert_eq!(handles, ["c@x.com", "a@x.com", "b@x.com"]);
        Ok(())
    }
}

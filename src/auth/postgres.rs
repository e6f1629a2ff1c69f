//! Postgres-backed credential and session stores (`sql/schema.sql`).

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use std::sync::Arc;
use tracing::{warn, Instrument};
use uuid::Uuid;

use super::{
    clock::Clock,
    credentials::CredentialStore,
    error::StoreError,
    identity::{Identity, Role, StoredIdentity},
    sessions::{session_expiry, SessionStore},
    token::{generate_session_token, hash_session_token},
};

fn db_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity, StoreError> {
    let role: String = row.try_get("role").context("missing role column")?;
    Ok(Identity {
        id: row.try_get("id").context("missing id column")?,
        handle: row.try_get("handle").context("missing handle column")?,
        role: role.parse().map_err(|err| anyhow!("corrupt identity row: {err}"))?,
        created_at: row
            .try_get("created_at")
            .context("missing created_at column")?,
    })
}

fn count_from_row(row: &PgRow) -> Result<u64, StoreError> {
    let count: i64 = row.try_get("count").context("missing count column")?;
    Ok(u64::try_from(count).context("negative row count")?)
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(
        &self,
        handle: &str,
        secret_hash: &str,
        role: Role,
    ) -> Result<Identity, StoreError> {
        let query = r"
            INSERT INTO identities (id, handle, secret_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, handle, role, created_at
        ";
        let result = sqlx::query(query)
            .bind(Uuid::new_v4())
            .bind(handle)
            .bind(secret_hash)
            .bind(role.as_str())
            .bind(self.clock.now())
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await;

        match result {
            Ok(row) => identity_from_row(&row),
            Err(err) if is_unique_violation(&err) => Err(StoreError::DuplicateHandle),
            Err(err) => Err(anyhow::Error::new(err)
                .context("failed to insert identity")
                .into()),
        }
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<Identity>, StoreError> {
        let query = "SELECT id, handle, role, created_at FROM identities WHERE handle = $1";
        let row = sqlx::query(query)
            .bind(handle)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup identity by handle")?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_credentials(&self, handle: &str) -> Result<Option<StoredIdentity>, StoreError> {
        let query =
            "SELECT id, handle, role, created_at, secret_hash FROM identities WHERE handle = $1";
        let row = sqlx::query(query)
            .bind(handle)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup credentials")?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(StoredIdentity {
            identity: identity_from_row(&row)?,
            secret_hash: row
                .try_get("secret_hash")
                .context("missing secret_hash column")?,
        }))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let query = "SELECT id, handle, role, created_at FROM identities WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup identity by id")?;
        row.as_ref().map(identity_from_row).transpose()
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let query = "SELECT COUNT(*) AS count FROM identities";
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to count identities")?;
        count_from_row(&row)
    }

    async fn count_role(&self, role: Role) -> Result<u64, StoreError> {
        let query = "SELECT COUNT(*) AS count FROM identities WHERE role = $1";
        let row = sqlx::query(query)
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to count identities by role")?;
        count_from_row(&row)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Identity, StoreError> {
        let query = r"
            UPDATE identities
            SET role = $2
            WHERE id = $1
            RETURNING id, handle, role, created_at
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .context("failed to update identity role")?;
        row.as_ref()
            .map(identity_from_row)
            .transpose()?
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let query = "SELECT id, handle, role, created_at FROM identities ORDER BY created_at, id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to list identities")?;
        rows.iter().map(identity_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;
        conn.ping().await.context("failed to ping database")?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool, ttl: TimeDelta, clock: Arc<dyn Clock>) -> Self {
        Self { pool, ttl, clock }
    }

    async fn delete_hash(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        let query = "DELETE FROM sessions WHERE token_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, identity_id: Uuid) -> Result<String, StoreError> {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let created_at: DateTime<Utc> = self.clock.now();
        let expires_at = session_expiry(created_at, self.ttl)?;

        // Locking the identity row serializes concurrent logins for it, so the
        // delete + insert below can never leave two live sessions.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin session transaction")?;

        let query = "SELECT id FROM identities WHERE id = $1 FOR UPDATE";
        let owner = sqlx::query(query)
            .bind(identity_id)
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lock identity")?;
        if owner.is_none() {
            if let Err(err) = tx.rollback().await {
                warn!("failed to roll back session transaction: {err}");
            }
            return Err(StoreError::NotFound);
        }

        let query = "DELETE FROM sessions WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&mut *tx)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to drop previous session")?;

        let query = r"
            INSERT INTO sessions (token_hash, identity_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4)
        ";
        sqlx::query(query)
            .bind(&token_hash)
            .bind(identity_id)
            .bind(created_at)
            .bind(expires_at)
            .execute(&mut *tx)
            .instrument(db_span("INSERT", query))
            .await
            .context("failed to insert session")?;

        tx.commit().await.context("commit session transaction")?;

        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        let token_hash = hash_session_token(token);
        let query = "SELECT identity_id, expires_at FROM sessions WHERE token_hash = $1";
        let row = sqlx::query(query)
            .bind(&token_hash)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup session")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let identity_id: Uuid = row
            .try_get("identity_id")
            .context("missing identity_id column")?;
        let expires_at: DateTime<Utc> = row
            .try_get("expires_at")
            .context("missing expires_at column")?;

        if self.clock.now() >= expires_at {
            // Best effort: the read already reports the session as absent.
            if let Err(err) = self.delete_hash(&token_hash).await {
                warn!(%identity_id, "failed to purge expired session: {err}");
            }
            return Ok(None);
        }

        Ok(Some(identity_id))
    }

    async fn destroy(&self, token: &str) -> Result<(), StoreError> {
        self.delete_hash(&hash_session_token(token)).await
    }

    async fn destroy_all_for_identity(&self, identity_id: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM sessions WHERE identity_id = $1";
        sqlx::query(query)
            .bind(identity_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to delete identity sessions")?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let query = "DELETE FROM sessions WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(self.clock.now())
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to purge expired sessions")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    //! Runs only when `GATEHOUSE_TEST_DSN` points at a database loaded with
    //! `sql/schema.sql`.

    use super::*;
    use crate::auth::clock::ManualClock;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    async fn pool() -> Result<Option<PgPool>> {
        let Ok(dsn) = std::env::var("GATEHOUSE_TEST_DSN") else {
            eprintln!("Skipping postgres test: GATEHOUSE_TEST_DSN not set");
            return Ok(None);
        };
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&dsn)
            .await
            .context("failed to connect test pool")?;
        Ok(Some(pool))
    }

    fn unique_handle() -> String {
        format!("{}@test.gatehouse.dev", Uuid::new_v4())
    }

    #[tokio::test]
    async fn credential_store_round_trip() -> Result<()> {
        let Some(pool) = pool().await? else {
            return Ok(());
        };
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let store = PgCredentialStore::new(pool, clock);
        let handle = unique_handle();

        let created = store.create(&handle, "hash", Role::Standard).await?;
        let duplicate = store.create(&handle, "hash", Role::Standard).await;
        assert!(matches!(duplicate, Err(StoreError::DuplicateHandle)));

        let stored = store.find_credentials(&handle).await?;
        assert_eq!(stored.map(|s| s.secret_hash), Some("hash".to_string()));

        let updated = store.update_role(created.id, Role::Privileged).await?;
        assert_eq!(updated.role, Role::Privileged);
        assert!(matches!(
            store.update_role(Uuid::new_v4(), Role::Standard).await,
            Err(StoreError::NotFound)
        ));
        store.ping().await?;
        Ok(())
    }

    #[tokio::test]
    async fn session_store_single_session_and_expiry() -> Result<()> {
        let Some(pool) = pool().await? else {
            return Ok(());
        };
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let credentials = PgCredentialStore::new(pool.clone(), clock.clone());
        let sessions = PgSessionStore::new(pool, TimeDelta::seconds(60), clock.clone());

        let identity = credentials
            .create(&unique_handle(), "hash", Role::Standard)
            .await?;
        let first = sessions.create(identity.id).await?;
        let second = sessions.create(identity.id).await?;
        assert_eq!(sessions.resolve(&first).await?, None);
        assert_eq!(sessions.resolve(&second).await?, Some(identity.id));

        clock.advance(TimeDelta::seconds(60));
        assert_eq!(sessions.resolve(&second).await?, None);

        assert!(matches!(
            sessions.create(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn overflowing_expiry_fails_before_touching_the_database() -> Result<()> {
        // Lazy pool: nothing connects unless a query runs.
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/gatehouse")?;
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let ttl = TimeDelta::try_days(100_000_000).expect("representable delta");
        let store = PgSessionStore::new(pool, ttl, clock);

        let result = store.create(Uuid::new_v4()).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        Ok(())
    }
}

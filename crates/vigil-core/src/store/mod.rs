//! Credential store
//!
//! Every operation is a single round trip. Revocations are conditional
//! updates (`WHERE is_active = true`, `WHERE status = 'active'`) so two
//! concurrent revokers never both observe success.

mod memory;
mod postgres;

pub use memory::{InMemoryCredentialStore, StoreFault};
pub use postgres::PgCredentialStore;

use crate::config::{DatabaseConfig, MEMORY_DATABASE_URL};
use crate::models::{
    ApiKey, ApiKeyIdentity, AuditEvent, AuditFilter, LoginActivity, NewApiKey, NewAuditEvent,
    NewSession, NewUser, Session, User, UserChanges,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence seam for users, sessions, API keys, audit events and login activity
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Round-trip health probe
    async fn ping(&self) -> Result<()>;

    // ------------------------------------------------------------------
    // Users (soft-deleted rows are invisible to every read)
    // ------------------------------------------------------------------

    async fn find_user(&self, id: i64) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// All non-deleted users, oldest first
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn username_taken(&self, username: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> Result<bool>;

    async fn insert_user(&self, user: NewUser) -> Result<User>;

    /// COALESCE-style partial update. `None` when the user does not exist.
    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<Option<User>>;

    /// Soft-delete the given ids, skipping the protected administrator.
    /// Returns the ids actually deleted.
    async fn soft_delete_users(&self, ids: &[i64]) -> Result<Vec<i64>>;

    /// Returns false when the user does not exist
    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<bool>;

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    async fn insert_session(&self, session: NewSession) -> Result<Session>;

    /// is_active AND expires_at > now
    async fn is_session_live(&self, id: Uuid) -> Result<bool>;

    /// Live sessions, newest first, optionally for one user
    async fn list_live_sessions(&self, user_id: Option<i64>) -> Result<Vec<Session>>;

    /// True iff a previously active row was flipped
    async fn revoke_session(&self, id: Uuid, revoked_by: Option<i64>) -> Result<bool>;

    async fn revoke_user_sessions(&self, user_id: i64, revoked_by: Option<i64>) -> Result<u64>;

    async fn revoke_all_sessions(&self, revoked_by: Option<i64>) -> Result<u64>;

    /// Live session count per user id
    async fn live_session_counts(&self) -> Result<HashMap<i64, i64>>;

    // ------------------------------------------------------------------
    // API keys
    // ------------------------------------------------------------------

    async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKey>;

    /// Active key joined to a non-deleted owner
    async fn find_api_key_identity(&self, key_hash: &str) -> Result<Option<ApiKeyIdentity>>;

    /// Bump total_calls and last_used_at on an active key
    async fn record_api_key_usage(&self, key_id: i64) -> Result<()>;

    async fn find_api_key(&self, key_id: i64) -> Result<Option<ApiKey>>;

    /// Active keys, newest first, optionally for one user
    async fn list_api_keys(&self, user_id: Option<i64>) -> Result<Vec<ApiKey>>;

    /// True iff a previously active key was flipped
    async fn revoke_api_key(&self, key_id: i64, revoked_by: Option<i64>) -> Result<bool>;

    // ------------------------------------------------------------------
    // Audit log (append-only: there is no update or delete)
    // ------------------------------------------------------------------

    async fn insert_audit_event(&self, event: NewAuditEvent) -> Result<()>;

    /// Newest first, paginated by the filter
    async fn list_audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>>;

    async fn count_audit_events(&self, filter: &AuditFilter) -> Result<i64>;

    // ------------------------------------------------------------------
    // Login activity
    // ------------------------------------------------------------------

    /// Additive upsert on (user_id, day)
    async fn record_login_activity(
        &self,
        user_id: i64,
        day: NaiveDate,
        logins: i64,
        failures: i64,
    ) -> Result<()>;

    /// Rows with day >= since, for every user
    async fn login_activity_since(&self, since: NaiveDate) -> Result<Vec<LoginActivity>>;

    /// Rows with day >= since, for one user
    async fn user_login_activity_since(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<LoginActivity>>;
}

/// Open the configured store. PostgreSQL stores are migrated before use.
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn CredentialStore>> {
    if config.url == MEMORY_DATABASE_URL {
        tracing::warn!("Using the in-memory credential store; nothing survives a restart");
        return Ok(Arc::new(InMemoryCredentialStore::new()));
    }

    let store = PgCredentialStore::connect(config).await?;
    store.migrate().await?;
    tracing::info!(pool_size = config.pool_size, "Connected to PostgreSQL credential store");
    Ok(Arc::new(store))
}

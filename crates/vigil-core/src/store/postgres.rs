//! PostgreSQL credential store
//!
//! Backed by SQLx. Schema lives in `migrations/` and is applied with
//! [`PgCredentialStore::migrate`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

use super::CredentialStore;
use crate::config::DatabaseConfig;
use crate::models::{
    ApiKey, ApiKeyIdentity, AuditEvent, AuditFilter, LoginActivity, NewApiKey, NewAuditEvent,
    NewSession, NewUser, Session, User, UserChanges,
};
use crate::{Result, Screen, VigilError, PROTECTED_USER_ID};

const USER_COLUMNS: &str = "id, username, email, password_hash, name, role, access_level, \
     allowed_screens, mfa_enabled, api_access, data_access, status, department, location, \
     created_at, updated_at, last_login_at, deleted_at";

const SESSION_COLUMNS: &str = "id, user_id, ip_address, user_agent, device_label, location, \
     risk_level, is_active, expires_at, created_at, revoked_at, revoked_by";

const API_KEY_COLUMNS: &str = "id, user_id, name, key_prefix, scope, total_calls, last_used_at, \
     status, created_at, revoked_at, revoked_by";

const AUDIT_COLUMNS: &str = "id, actor_id, actor_username, action, resource_type, resource_id, \
     level, detail, metadata, ip_address, created_at";

const AUDIT_PREDICATE: &str = "($1::TEXT IS NULL OR level = $1) \
     AND ($2::TEXT IS NULL OR action ILIKE $2) \
     AND ($3::TEXT IS NULL OR actor_username ILIKE $3)";

/// PostgreSQL credential store
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Open a connection pool
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Migration failed: {e}")))
    }
}

/// Map a write failure, turning the partial unique indexes on users into conflicts.
fn user_write_error(context: &str, e: sqlx::Error) -> VigilError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("users_username_live_idx") => {
                    return VigilError::Conflict("Username already exists".to_string())
                }
                Some("users_email_live_idx") => {
                    return VigilError::Conflict("Email already exists".to_string())
                }
                _ => {}
            }
        }
    }
    VigilError::DatabaseError(format!("Failed to {context}: {e}"))
}

/// Case-insensitive substring pattern with LIKE metacharacters escaped
fn like_pattern(needle: &Option<String>) -> Option<String> {
    needle.as_ref().map(|n| {
        let escaped = n
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        format!("%{escaped}%")
    })
}

fn screen_names(screens: &[Screen]) -> Vec<String> {
    screens.iter().map(|s| s.as_str().to_string()).collect()
}

/// User row from database
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    access_level: String,
    allowed_screens: Vec<String>,
    mfa_enabled: bool,
    api_access: bool,
    data_access: String,
    status: String,
    department: Option<String>,
    location: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = VigilError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role.parse()?,
            access_level: row.access_level.parse()?,
            allowed_screens: Screen::parse_list(&row.allowed_screens),
            mfa_enabled: row.mfa_enabled,
            api_access: row.api_access,
            data_access: row.data_access,
            status: row.status.parse()?,
            department: row.department,
            location: row.location,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Session row from database
#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    device_label: Option<String>,
    location: Option<String>,
    risk_level: String,
    is_active: bool,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<i64>,
}

impl TryFrom<SessionRow> for Session {
    type Error = VigilError;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(Session {
            id: row.id,
            user_id: row.user_id,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            device_label: row.device_label,
            location: row.location,
            risk_level: row.risk_level.parse()?,
            is_active: row.is_active,
            expires_at: row.expires_at,
            created_at: row.created_at,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
        })
    }
}

/// API key row from database (the hash column is never selected)
#[derive(Debug, FromRow)]
struct ApiKeyRow {
    id: i64,
    user_id: i64,
    name: String,
    key_prefix: String,
    scope: String,
    total_calls: i64,
    last_used_at: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
    revoked_by: Option<i64>,
}

impl TryFrom<ApiKeyRow> for ApiKey {
    type Error = VigilError;

    fn try_from(row: ApiKeyRow) -> Result<Self> {
        Ok(ApiKey {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            key_prefix: row.key_prefix,
            scope: row.scope,
            total_calls: row.total_calls,
            last_used_at: row.last_used_at,
            status: row.status.parse()?,
            created_at: row.created_at,
            revoked_at: row.revoked_at,
            revoked_by: row.revoked_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApiKeyIdentityRow {
    key_id: i64,
    #[sqlx(flatten)]
    user: UserRow,
}

/// Audit row from database
#[derive(Debug, FromRow)]
struct AuditRow {
    id: i64,
    actor_id: Option<i64>,
    actor_username: String,
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    level: String,
    detail: Option<String>,
    metadata: serde_json::Value,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = VigilError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(AuditEvent {
            id: row.id,
            actor_id: row.actor_id,
            actor_username: row.actor_username,
            action: row.action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            level: row.level.parse()?,
            detail: row.detail,
            metadata: row.metadata,
            ip_address: row.ip_address,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LoginActivityRow {
    user_id: i64,
    day: NaiveDate,
    login_count: i64,
    failed_count: i64,
}

impl From<LoginActivityRow> for LoginActivity {
    fn from(row: LoginActivityRow) -> Self {
        LoginActivity {
            user_id: row.user_id,
            day: row.day,
            login_count: row.login_count,
            failed_count: row.failed_count,
        }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Ping failed: {e}")))?;
        Ok(())
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to get user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND deleted_at IS NULL"
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to get user: {e}")))?;

        row.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY id ASC");
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to list users: {e}")))?;

        rows.into_iter().map(User::try_from).collect()
    }

    async fn username_taken(&self, username: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE username = $1 AND deleted_at IS NULL
                  AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(username)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to check username: {e}")))?;

        Ok(row.0)
    }

    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM users
                WHERE email = $1 AND deleted_at IS NULL
                  AND ($2::BIGINT IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to check email: {e}")))?;

        Ok(row.0)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (
                username, email, password_hash, name, role, access_level,
                allowed_screens, mfa_enabled, api_access, data_access, status,
                department, location
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row: UserRow = sqlx::query_as(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.role.access_level().as_str())
            .bind(screen_names(&user.allowed_screens))
            .bind(user.mfa_enabled)
            .bind(user.api_access)
            .bind(&user.data_access)
            .bind(user.status.as_str())
            .bind(&user.department)
            .bind(&user.location)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| user_write_error("create user", e))?;

        User::try_from(row)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                access_level = COALESCE($5, access_level),
                allowed_screens = COALESCE($6::TEXT[], allowed_screens),
                mfa_enabled = COALESCE($7, mfa_enabled),
                api_access = COALESCE($8, api_access),
                data_access = COALESCE($9, data_access),
                status = COALESCE($10, status),
                department = COALESCE($11, department),
                location = COALESCE($12, location),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING {USER_COLUMNS}
            "#
        );
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&changes.name)
            .bind(&changes.email)
            .bind(changes.role.map(|r| r.as_str()))
            .bind(changes.access_level().map(|a| a.as_str()))
            .bind(changes.allowed_screens.as_deref().map(screen_names))
            .bind(changes.mfa_enabled)
            .bind(changes.api_access)
            .bind(&changes.data_access)
            .bind(changes.status.map(|s| s.as_str()))
            .bind(&changes.department)
            .bind(&changes.location)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| user_write_error("update user", e))?;

        row.map(User::try_from).transpose()
    }

    async fn soft_delete_users(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            UPDATE users SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = ANY($1) AND id <> $2 AND deleted_at IS NULL
            RETURNING id
            "#,
        )
        .bind(ids)
        .bind(PROTECTED_USER_ID)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to delete users: {e}")))?;

        let mut deleted: Vec<i64> = rows.into_iter().map(|r| r.0).collect();
        deleted.sort_unstable();
        Ok(deleted)
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET password_hash = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to set password: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to record login: {e}")))?;
        Ok(())
    }

    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        let sql = format!(
            r#"
            INSERT INTO sessions (
                id, user_id, ip_address, user_agent, device_label, location,
                risk_level, expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SESSION_COLUMNS}
            "#
        );
        let row: SessionRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(session.user_id)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(&session.device_label)
            .bind(&session.location)
            .bind(session.risk_level.as_str())
            .bind(session.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to create session: {e}")))?;

        Session::try_from(row)
    }

    async fn is_session_live(&self, id: Uuid) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sessions
                WHERE id = $1 AND is_active AND expires_at > NOW()
            )
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to check session: {e}")))?;

        Ok(row.0)
    }

    async fn list_live_sessions(&self, user_id: Option<i64>) -> Result<Vec<Session>> {
        let sql = format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE is_active AND expires_at > NOW()
              AND ($1::BIGINT IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            "#
        );
        let rows: Vec<SessionRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to list sessions: {e}")))?;

        rows.into_iter().map(Session::try_from).collect()
    }

    async fn revoke_session(&self, id: Uuid, revoked_by: Option<i64>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET is_active = FALSE, revoked_at = NOW(), revoked_by = $2
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(id)
        .bind(revoked_by)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to revoke session: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_user_sessions(&self, user_id: i64, revoked_by: Option<i64>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET is_active = FALSE, revoked_at = NOW(), revoked_by = $2
            WHERE user_id = $1 AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .bind(revoked_by)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to revoke user sessions: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn revoke_all_sessions(&self, revoked_by: Option<i64>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sessions SET is_active = FALSE, revoked_at = NOW(), revoked_by = $1
            WHERE is_active = TRUE
            "#,
        )
        .bind(revoked_by)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to revoke sessions: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn live_session_counts(&self) -> Result<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(*) FROM sessions
            WHERE is_active AND expires_at > NOW()
            GROUP BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to count sessions: {e}")))?;

        Ok(rows.into_iter().collect())
    }

    async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKey> {
        let sql = format!(
            r#"
            INSERT INTO api_keys (user_id, name, key_prefix, key_hash, scope)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {API_KEY_COLUMNS}
            "#
        );
        let row: ApiKeyRow = sqlx::query_as(&sql)
            .bind(key.user_id)
            .bind(&key.name)
            .bind(&key.key_prefix)
            .bind(&key.key_hash)
            .bind(&key.scope)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to create API key: {e}")))?;

        ApiKey::try_from(row)
    }

    async fn find_api_key_identity(&self, key_hash: &str) -> Result<Option<ApiKeyIdentity>> {
        let row: Option<ApiKeyIdentityRow> = sqlx::query_as(
            r#"
            SELECT k.id AS key_id,
                   u.id, u.username, u.email, u.password_hash, u.name, u.role,
                   u.access_level, u.allowed_screens, u.mfa_enabled, u.api_access,
                   u.data_access, u.status, u.department, u.location, u.created_at,
                   u.updated_at, u.last_login_at, u.deleted_at
            FROM api_keys k
            JOIN users u ON u.id = k.user_id
            WHERE k.key_hash = $1 AND k.status = 'active' AND u.deleted_at IS NULL
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to look up API key: {e}")))?;

        match row {
            Some(row) => Ok(Some(ApiKeyIdentity {
                key_id: row.key_id,
                user: User::try_from(row.user)?,
            })),
            None => Ok(None),
        }
    }

    async fn record_api_key_usage(&self, key_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE api_keys SET total_calls = total_calls + 1, last_used_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(key_id)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to record API key usage: {e}")))?;
        Ok(())
    }

    async fn find_api_key(&self, key_id: i64) -> Result<Option<ApiKey>> {
        let sql = format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = $1");
        let row: Option<ApiKeyRow> = sqlx::query_as(&sql)
            .bind(key_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to get API key: {e}")))?;

        row.map(ApiKey::try_from).transpose()
    }

    async fn list_api_keys(&self, user_id: Option<i64>) -> Result<Vec<ApiKey>> {
        let sql = format!(
            r#"
            SELECT {API_KEY_COLUMNS} FROM api_keys
            WHERE status = 'active' AND ($1::BIGINT IS NULL OR user_id = $1)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let rows: Vec<ApiKeyRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to list API keys: {e}")))?;

        rows.into_iter().map(ApiKey::try_from).collect()
    }

    async fn revoke_api_key(&self, key_id: i64, revoked_by: Option<i64>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys SET status = 'revoked', revoked_at = NOW(), revoked_by = $2
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(key_id)
        .bind(revoked_by)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to revoke API key: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_audit_event(&self, event: NewAuditEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                actor_id, actor_username, action, resource_type, resource_id,
                level, detail, metadata, ip_address
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.actor_id)
        .bind(&event.actor_username)
        .bind(&event.action)
        .bind(&event.resource_type)
        .bind(&event.resource_id)
        .bind(event.level.as_str())
        .bind(&event.detail)
        .bind(&event.metadata)
        .bind(&event.ip_address)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to write audit event: {e}")))?;
        Ok(())
    }

    async fn list_audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let sql = format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM audit_log
            WHERE {AUDIT_PREDICATE}
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        );
        let rows: Vec<AuditRow> = sqlx::query_as(&sql)
            .bind(filter.level.map(|l| l.as_str()))
            .bind(like_pattern(&filter.action))
            .bind(like_pattern(&filter.username))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to list audit events: {e}")))?;

        rows.into_iter().map(AuditEvent::try_from).collect()
    }

    async fn count_audit_events(&self, filter: &AuditFilter) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM audit_log WHERE {AUDIT_PREDICATE}");
        let row: (i64,) = sqlx::query_as(&sql)
            .bind(filter.level.map(|l| l.as_str()))
            .bind(like_pattern(&filter.action))
            .bind(like_pattern(&filter.username))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VigilError::DatabaseError(format!("Failed to count audit events: {e}")))?;

        Ok(row.0)
    }

    async fn record_login_activity(
        &self,
        user_id: i64,
        day: NaiveDate,
        logins: i64,
        failures: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO login_activity (user_id, day, login_count, failed_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, day) DO UPDATE SET
                login_count = login_activity.login_count + EXCLUDED.login_count,
                failed_count = login_activity.failed_count + EXCLUDED.failed_count
            "#,
        )
        .bind(user_id)
        .bind(day)
        .bind(logins)
        .bind(failures)
        .execute(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to record login activity: {e}")))?;
        Ok(())
    }

    async fn login_activity_since(&self, since: NaiveDate) -> Result<Vec<LoginActivity>> {
        let rows: Vec<LoginActivityRow> = sqlx::query_as(
            r#"
            SELECT user_id, day, login_count, failed_count FROM login_activity
            WHERE day >= $1
            ORDER BY user_id, day
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to load login activity: {e}")))?;

        Ok(rows.into_iter().map(LoginActivity::from).collect())
    }

    async fn user_login_activity_since(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<LoginActivity>> {
        let rows: Vec<LoginActivityRow> = sqlx::query_as(
            r#"
            SELECT user_id, day, login_count, failed_count FROM login_activity
            WHERE user_id = $1 AND day >= $2
            ORDER BY day
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VigilError::DatabaseError(format!("Failed to load login activity: {e}")))?;

        Ok(rows.into_iter().map(LoginActivity::from).collect())
    }
}

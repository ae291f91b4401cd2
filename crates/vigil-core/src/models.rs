//! Persisted records and their insert/update shapes
//!
//! These map to the tables created by `migrations/`. Secrets never leave the
//! store through these types: users carry a password hash that is not
//! serializable, and API key records do not carry the key hash at all.

use crate::{AccessLevel, ApiKeyStatus, AuditLevel, RiskLevel, Role, Screen, UserStatus};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Default capability granted to new API keys.
pub const DEFAULT_API_KEY_SCOPE: &str = "read:all";

/// Default data classification for new accounts.
pub const DEFAULT_DATA_ACCESS: &str = "internal";

/// Largest page the audit listing will return.
pub const MAX_AUDIT_PAGE: i64 = 500;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_AUDIT_PAGE: i64 = 100;

/// User account as stored.
///
/// Carries the password hash, so it is deliberately not `Serialize`.
/// Convert with [`User::to_public`] before returning it to a caller.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub access_level: AccessLevel,
    pub allowed_screens: Vec<Screen>,
    pub mfa_enabled: bool,
    pub api_access: bool,
    pub data_access: String,
    pub status: UserStatus,
    pub department: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active && self.deleted_at.is_none()
    }

    /// Whether this account may issue API keys
    pub fn can_issue_api_keys(&self) -> bool {
        self.api_access || self.role == Role::SuperAdmin
    }

    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
            access_level: self.access_level,
            allowed_screens: self.allowed_screens.clone(),
            mfa_enabled: self.mfa_enabled,
            api_access: self.api_access,
            data_access: self.data_access.clone(),
            status: self.status,
            department: self.department.clone(),
            location: self.location.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login_at: self.last_login_at,
        }
    }
}

/// Public user representation (safe for API responses)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub access_level: AccessLevel,
    pub allowed_screens: Vec<Screen>,
    pub mfa_enabled: bool,
    pub api_access: bool,
    pub data_access: String,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Fields for a new account. The password must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub allowed_screens: Vec<Screen>,
    pub mfa_enabled: bool,
    pub api_access: bool,
    pub data_access: String,
    pub status: UserStatus,
    pub department: Option<String>,
    pub location: Option<String>,
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub allowed_screens: Option<Vec<Screen>>,
    pub mfa_enabled: Option<bool>,
    pub api_access: Option<bool>,
    pub data_access: Option<String>,
    pub status: Option<UserStatus>,
    pub department: Option<String>,
    pub location: Option<String>,
}

impl UserChanges {
    /// Access level to store alongside a role change, if any.
    pub fn access_level(&self) -> Option<AccessLevel> {
        self.role.map(|role| role.access_level())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.allowed_screens.is_none()
            && self.mfa_enabled.is_none()
            && self.api_access.is_none()
            && self.data_access.is_none()
            && self.status.is_none()
            && self.department.is_none()
            && self.location.is_none()
    }
}

/// One authenticated login instance
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub id: Uuid,
    pub user_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_label: Option<String>,
    pub location: Option<String>,
    pub risk_level: RiskLevel,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<i64>,
}

impl Session {
    /// A session is live while it is active and not yet expired.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Fields for a new session row
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_label: Option<String>,
    pub location: Option<String>,
    pub risk_level: RiskLevel,
    pub expires_at: DateTime<Utc>,
}

/// API key record as returned by listings. The key hash is never loaded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKey {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub key_prefix: String,
    pub scope: String,
    pub total_calls: i64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub status: ApiKeyStatus,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<i64>,
}

/// Fields for a new API key row
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: i64,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub scope: String,
}

/// Result of a successful key-hash lookup
#[derive(Debug, Clone)]
pub struct ApiKeyIdentity {
    pub key_id: i64,
    pub user: User,
}

/// Immutable record of a privileged action
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    pub id: i64,
    pub actor_id: Option<i64>,
    pub actor_username: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub level: AuditLevel,
    pub detail: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit record to append. Only the actor name and action are required.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEvent {
    pub actor_id: Option<i64>,
    pub actor_username: String,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub level: AuditLevel,
    pub detail: Option<String>,
    pub metadata: serde_json::Value,
    pub ip_address: Option<String>,
}

impl NewAuditEvent {
    pub fn new(actor_username: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            actor_username: actor_username.into(),
            action: action.into(),
            resource_type: None,
            resource_id: None,
            level: AuditLevel::Info,
            detail: None,
            metadata: serde_json::json!({}),
            ip_address: None,
        }
    }

    /// Event attributed to the system rather than a user
    pub fn system(action: impl Into<String>) -> Self {
        Self::new("system", action)
    }

    pub fn actor(mut self, actor_id: i64) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn resource(mut self, resource_type: &str, resource_id: impl ToString) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn level(mut self, level: AuditLevel) -> Self {
        self.level = level;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

/// Audit listing filter, already normalized
#[derive(Debug, Clone, PartialEq)]
pub struct AuditFilter {
    /// Exact level match
    pub level: Option<AuditLevel>,
    /// Case-insensitive substring of the action code
    pub action: Option<String>,
    /// Case-insensitive substring of the actor username
    pub username: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            level: None,
            action: None,
            username: None,
            limit: DEFAULT_AUDIT_PAGE,
            offset: 0,
        }
    }
}

impl AuditFilter {
    /// Clamp pagination to `1..=500` and `>= 0`, and drop blank text filters.
    pub fn new(
        level: Option<AuditLevel>,
        action: Option<String>,
        username: Option<String>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Self {
        let non_blank = |s: Option<String>| s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            level,
            action: non_blank(action),
            username: non_blank(username),
            limit: limit.unwrap_or(DEFAULT_AUDIT_PAGE).clamp(1, MAX_AUDIT_PAGE),
            offset: offset.unwrap_or(0).max(0),
        }
    }

    /// In-process equivalent of the SQL predicate
    pub fn matches(&self, event: &AuditEvent) -> bool {
        let contains = |haystack: &str, needle: &Option<String>| {
            needle
                .as_ref()
                .map(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
                .unwrap_or(true)
        };

        self.level.map(|l| l == event.level).unwrap_or(true)
            && contains(&event.action, &self.action)
            && contains(&event.actor_username, &self.username)
    }
}

/// A page of audit events
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditPage {
    pub rows: Vec<AuditEvent>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Per-user, per-day login counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginActivity {
    pub user_id: i64,
    pub day: NaiveDate,
    pub login_count: i64,
    pub failed_count: i64,
}

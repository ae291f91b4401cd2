//! Vigil Core - domain types, configuration and the credential store
//!
//! This crate defines the pieces shared by the API server and the CLI:
//! - Closed enumerations for roles, screens and record states
//! - Persisted records (users, sessions, API keys, audit events, login activity)
//! - The `CredentialStore` trait with PostgreSQL and in-memory implementations
//! - Configuration management
//! - Common error types

pub mod config;
pub mod models;
pub mod store;

pub use config::{AppConfig, AuthConfig, ConfigError, DatabaseConfig, SessionCheckPolicy};
pub use models::*;
pub use store::{open_store, CredentialStore, InMemoryCredentialStore, PgCredentialStore, StoreFault};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// The protected system administrator. Never deleted, individually or in bulk.
pub const PROTECTED_USER_ID: i64 = 1;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Vigil operations
#[derive(Error, Debug)]
pub enum VigilError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;

// ============================================================================
// Closed enumerations
// ============================================================================

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum whose
/// wire form is a fixed string per variant.
macro_rules! string_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = VigilError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    _ => Err(VigilError::ValidationError(format!("Invalid {}: {s}", $what))),
                }
            }
        }
    };
}

/// User role
///
/// The role set is fixed. Validation of incoming payloads and the role
/// guards both work on this type, so an unknown role can never reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Developer,
    Analyst,
    Viewer,
}

string_enum!(Role, "role", {
    SuperAdmin => "super_admin",
    Admin => "admin",
    Developer => "developer",
    Analyst => "analyst",
    Viewer => "viewer",
});

/// Roles allowed on admin-only routes.
pub const ADMIN_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin];

impl Role {
    pub fn is_admin(&self) -> bool {
        ADMIN_ROLES.contains(self)
    }

    /// Access level derived from the role: write for admins, read otherwise.
    pub fn access_level(&self) -> AccessLevel {
        if self.is_admin() {
            AccessLevel::Write
        } else {
            AccessLevel::Read
        }
    }

    /// Screens granted when a user is created without an explicit list.
    pub fn default_screens(&self) -> Vec<Screen> {
        match self {
            Role::SuperAdmin | Role::Admin => Screen::ALL.to_vec(),
            Role::Developer => vec![
                Screen::Dashboard,
                Screen::QueryPerformance,
                Screen::SchemaDiff,
                Screen::ConnectionPools,
                Screen::Connections,
                Screen::ApiKeys,
            ],
            Role::Analyst => vec![
                Screen::Dashboard,
                Screen::Alerts,
                Screen::QueryPerformance,
                Screen::Replication,
            ],
            Role::Viewer => vec![Screen::Dashboard, Screen::Alerts],
        }
    }
}

/// Derived access level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

string_enum!(AccessLevel, "access level", {
    Read => "read",
    Write => "write",
});

/// Dashboard screen identifiers used by the screen guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Screen {
    Dashboard,
    Alerts,
    QueryPerformance,
    SchemaDiff,
    ConnectionPools,
    Connections,
    Replication,
    Backups,
    UserManagement,
    Sessions,
    ApiKeys,
    AuditLog,
    Settings,
}

string_enum!(Screen, "screen", {
    Dashboard => "Dashboard",
    Alerts => "Alerts",
    QueryPerformance => "QueryPerformance",
    SchemaDiff => "SchemaDiff",
    ConnectionPools => "ConnectionPools",
    Connections => "Connections",
    Replication => "Replication",
    Backups => "Backups",
    UserManagement => "UserManagement",
    Sessions => "Sessions",
    ApiKeys => "ApiKeys",
    AuditLog => "AuditLog",
    Settings => "Settings",
});

impl Screen {
    /// Parse stored screen names, dropping any that are no longer known.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Vec<Screen> {
        names
            .iter()
            .filter_map(|name| match name.as_ref().parse() {
                Ok(screen) => Some(screen),
                Err(_) => {
                    tracing::warn!(screen = name.as_ref(), "Ignoring unknown screen identifier");
                    None
                }
            })
            .collect()
    }
}

/// Account status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Suspended,
    Inactive,
}

string_enum!(UserStatus, "status", {
    Active => "active",
    Suspended => "suspended",
    Inactive => "inactive",
});

/// Session risk classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

string_enum!(RiskLevel, "risk level", {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl RiskLevel {
    /// Classify a login by the number of failed attempts seen recently.
    pub fn from_recent_failures(failures: i64) -> Self {
        match failures {
            f if f >= 5 => RiskLevel::High,
            f if f >= 2 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

/// Audit event severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    #[default]
    Info,
    Warn,
    Critical,
    Success,
}

string_enum!(AuditLevel, "level", {
    Info => "info",
    Warn => "warn",
    Critical => "critical",
    Success => "success",
});

/// API key state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    #[default]
    Active,
    Revoked,
}

string_enum!(ApiKeyStatus, "API key status", {
    Active => "active",
    Revoked => "revoked",
});

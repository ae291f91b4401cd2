//! Application state management

use crate::audit::AuditLogger;
use crate::auth::{ApiKeyManager, AuthService, JwtConfig, PasswordConfig, SessionManager};
use crate::users::UserService;
use std::sync::Arc;
use std::time::Instant;
use vigil_core::{AppConfig, CredentialStore};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Credential store backing every manager below
    pub store: Arc<dyn CredentialStore>,
    /// Token signing settings
    pub jwt: JwtConfig,
    pub sessions: SessionManager,
    pub api_keys: ApiKeyManager,
    /// Background audit writer
    pub audit: AuditLogger,
    pub users: UserService,
    pub auth: AuthService,
}

impl AppState {
    /// Create state with production password hashing parameters.
    ///
    /// Spawns the audit worker, so this must run inside a Tokio runtime.
    pub fn new(config: AppConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_password_config(config, store, PasswordConfig::default())
    }

    pub fn with_password_config(
        config: AppConfig,
        store: Arc<dyn CredentialStore>,
        password: PasswordConfig,
    ) -> Self {
        let jwt = JwtConfig::from(&config.auth);
        let sessions = SessionManager::new(store.clone(), config.auth.session_ttl_hours);
        let api_keys = ApiKeyManager::new(store.clone(), config.auth.api_key_tag.clone());
        let audit = AuditLogger::spawn(store.clone());
        let users = UserService::new(
            store.clone(),
            sessions.clone(),
            password,
            config.auth.suspend_revokes_sessions,
        );
        let auth = AuthService::new(store.clone(), sessions.clone(), audit.clone(), jwt.clone());

        Self {
            config,
            start_time: Instant::now(),
            store,
            jwt,
            sessions,
            api_keys,
            audit,
            users,
            auth,
        }
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

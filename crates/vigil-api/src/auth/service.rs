//! Authentication service layer
//!
//! Password login, logout and the current-user lookup. Login creates the
//! session whose id is embedded in the issued token.

use super::jwt::{generate_access_token, JwtConfig};
use super::middleware::Principal;
use super::password::verify_password_blocking;
use super::session::{SessionContext, SessionManager};
use crate::audit::{self, AuditLogger, ClientContext};
use crate::error::AppError;
use crate::middleware::metrics::{record_auth_attempt, record_revocations};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use vigil_core::{AuditLevel, CredentialStore, NewAuditEvent, RiskLevel, User, UserPublic, UserStatus};

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// User login request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Successful login
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
    pub session_id: Uuid,
    pub user: UserPublic,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
    /// Whether a live session was revoked
    pub revoked: bool,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    sessions: SessionManager,
    audit: AuditLogger,
    jwt: JwtConfig,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: SessionManager,
        audit: AuditLogger,
        jwt: JwtConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            audit,
            jwt,
        }
    }

    /// Authenticate with username and password
    ///
    /// The password is checked before the account status so that status is
    /// never revealed to a caller without the right password.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: ClientContext,
    ) -> Result<LoginResponse, AppError> {
        let (username, password) = match (request.username, request.password) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => (u.trim().to_string(), p),
            _ => {
                return Err(AppError::BadRequest(
                    "username and password are required".to_string(),
                ))
            }
        };

        let Some(user) = self.store.find_user_by_username(&username).await? else {
            self.login_failed(&username, None, "unknown username", &client);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !verify_password_blocking(password, user.password_hash.clone()).await? {
            self.record_activity(user.id, 0, 1).await;
            self.login_failed(&username, Some(user.id), "wrong password", &client);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if user.status != UserStatus::Active {
            self.login_failed(&username, Some(user.id), "account not active", &client);
            return Err(AppError::Forbidden("Account suspended".to_string()));
        }

        let risk_level = self.risk_level_for(&user).await;
        self.record_activity(user.id, 1, 0).await;

        let now = Utc::now();
        if let Err(e) = self.store.touch_last_login(user.id, now).await {
            tracing::warn!(user_id = user.id, error = %e, "Failed to update last login");
        }

        let session_id = self
            .sessions
            .create_session(
                user.id,
                SessionContext {
                    ip_address: client.ip_address.clone(),
                    user_agent: client.user_agent.clone(),
                    location: None,
                    risk_level,
                },
            )
            .await?;

        let token = generate_access_token(&self.jwt, &user, Some(session_id))
            .map_err(|e| AppError::Internal(format!("Failed to generate access token: {e}")))?;

        record_auth_attempt("password", "success");
        self.audit.write_audit(
            NewAuditEvent::new(&user.username, audit::LOGIN_SUCCESS)
                .actor(user.id)
                .resource("session", session_id)
                .level(AuditLevel::Success)
                .metadata(serde_json::json!({ "risk_level": risk_level }))
                .ip(client.ip_address),
        );

        let mut public = user.to_public();
        public.last_login_at = Some(now);

        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_expiration_secs,
            session_id,
            user: public,
        })
    }

    /// Revoke the caller's own session
    ///
    /// API-key callers and tokens without a session have nothing to revoke.
    pub async fn logout(
        &self,
        principal: &Principal,
        client: ClientContext,
    ) -> Result<LogoutResponse, AppError> {
        let revoked = match principal.session_id {
            Some(sid) => self.sessions.revoke_session(sid, Some(principal.user_id)).await?,
            None => false,
        };
        record_revocations("session", u64::from(revoked));

        let mut event = NewAuditEvent::new(&principal.username, audit::LOGOUT)
            .actor(principal.user_id)
            .ip(client.ip_address);
        if let Some(sid) = principal.session_id {
            event = event.resource("session", sid);
        }
        self.audit.write_audit(event);

        Ok(LogoutResponse {
            success: true,
            revoked,
        })
    }

    /// Current account, re-read from the store
    pub async fn me(&self, principal: &Principal) -> Result<UserPublic, AppError> {
        self.store
            .find_user(principal.user_id)
            .await?
            .map(|user| user.to_public())
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Risk of a new session, from today's failed attempts for this user
    async fn risk_level_for(&self, user: &User) -> RiskLevel {
        let today = Utc::now().date_naive();
        match self.store.user_login_activity_since(user.id, today).await {
            Ok(rows) => RiskLevel::from_recent_failures(rows.iter().map(|r| r.failed_count).sum()),
            Err(e) => {
                tracing::warn!(user_id = user.id, error = %e, "Failed to read login activity");
                RiskLevel::Low
            }
        }
    }

    async fn record_activity(&self, user_id: i64, logins: i64, failures: i64) {
        let today = Utc::now().date_naive();
        if let Err(e) = self
            .store
            .record_login_activity(user_id, today, logins, failures)
            .await
        {
            tracing::warn!(user_id, error = %e, "Failed to record login activity");
        }
    }

    fn login_failed(&self, username: &str, user_id: Option<i64>, reason: &str, client: &ClientContext) {
        record_auth_attempt("password", "failure");

        let mut event = NewAuditEvent::new(username, audit::LOGIN_FAILED)
            .level(AuditLevel::Warn)
            .detail(reason)
            .ip(client.ip_address.clone());
        if let Some(id) = user_id {
            event = event.actor(id).resource("user", id);
        }
        self.audit.write_audit(event);
    }
}

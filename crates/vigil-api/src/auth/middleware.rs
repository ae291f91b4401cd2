/// Authentication middleware for protecting routes
///
/// Resolves the request's credential into a [`Principal`] and adds it to the
/// request extensions. An `X-API-Key` header takes precedence; otherwise a
/// bearer token is required. Bearer tokens that carry a session id are
/// checked against the session store on every request.
use super::jwt::{validate_access_token, Claims, JwtError};
use crate::audit::{extract_ip_address, extract_user_agent};
use crate::middleware::metrics::record_auth_attempt;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use vigil_core::{AccessLevel, Role, Screen, SessionCheckPolicy, User, UserStatus};

use crate::error::ErrorResponse;

/// Header carrying an API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// How the principal authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Bearer,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::Bearer => "bearer",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

/// Authenticated caller
///
/// Added to request extensions by [`auth_middleware`]; handlers extract it
/// with `Extension<Principal>`.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub allowed_screens: Vec<Screen>,
    pub access_level: AccessLevel,
    /// Session the bearer token was issued for, if any
    pub session_id: Option<Uuid>,
    pub method: AuthMethod,
}

impl Principal {
    pub fn from_user(user: &User, method: AuthMethod) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            allowed_screens: user.allowed_screens.clone(),
            access_level: user.access_level,
            session_id: None,
            method,
        }
    }

    pub fn from_claims(claims: Claims) -> Result<Self, JwtError> {
        Ok(Self {
            user_id: claims.user_id()?,
            username: claims.username,
            role: claims.role,
            allowed_screens: claims.allowed_screens,
            access_level: claims.access_level,
            session_id: claims.sid,
            method: AuthMethod::Bearer,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn can_view(&self, screen: Screen) -> bool {
        self.allowed_screens.contains(&screen)
    }
}

/// Authentication and authorization errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingCredential,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    #[error("Session has been revoked")]
    SessionRevoked,

    #[error("Account suspended")]
    AccountSuspended,

    #[error("Session check unavailable")]
    SessionCheckUnavailable,

    #[error("Access denied")]
    AccessDenied,

    #[error("Insufficient permissions")]
    InsufficientRole,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential
            | AuthError::InvalidApiKey
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::SessionRevoked => StatusCode::UNAUTHORIZED,
            AuthError::AccountSuspended | AuthError::AccessDenied | AuthError::InsufficientRole => {
                StatusCode::FORBIDDEN
            }
            AuthError::SessionCheckUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::InvalidToken(_) => "Invalid or expired token".to_string(),
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "Authentication failed unexpectedly");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// Authentication middleware that requires an API key or a bearer token
///
/// ```ignore
/// let protected = Router::new()
///     .route("/sessions/me", get(my_sessions))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let principal = match request.headers().get(API_KEY_HEADER) {
        Some(raw) => {
            let raw = raw.to_str().map_err(|_| AuthError::InvalidApiKey)?.to_string();
            authenticate_api_key(&state, request.headers(), &raw).await?
        }
        None => authenticate_bearer(&state, request.headers()).await?,
    };

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

async fn authenticate_api_key(
    state: &AppState,
    headers: &HeaderMap,
    raw_key: &str,
) -> Result<Principal, AuthError> {
    let user = match state.api_keys.authenticate_api_key(raw_key).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            record_auth_attempt("api_key", "invalid");
            tracing::warn!(
                target: "audit",
                ip_address = ?extract_ip_address(headers),
                user_agent = ?extract_user_agent(headers),
                "Rejected unknown or revoked API key"
            );
            return Err(AuthError::InvalidApiKey);
        }
        Err(e) => {
            record_auth_attempt("api_key", "error");
            return Err(AuthError::Internal(format!("API key lookup failed: {e}")));
        }
    };

    if user.status != UserStatus::Active {
        record_auth_attempt("api_key", "suspended");
        tracing::warn!(
            target: "audit",
            user_id = user.id,
            username = %user.username,
            "API key used by a non-active account"
        );
        return Err(AuthError::AccountSuspended);
    }

    record_auth_attempt("api_key", "success");
    Ok(Principal::from_user(&user, AuthMethod::ApiKey))
}

async fn authenticate_bearer(state: &AppState, headers: &HeaderMap) -> Result<Principal, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredential)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let claims = validate_access_token(&state.jwt, token).map_err(|e| {
        record_auth_attempt("bearer", "invalid");
        tracing::warn!(
            target: "audit",
            ip_address = ?extract_ip_address(headers),
            reason = %e,
            "Rejected bearer token"
        );
        AuthError::InvalidToken(e)
    })?;

    if let Some(sid) = claims.sid {
        match state.sessions.is_session_active(sid).await {
            Ok(true) => {}
            Ok(false) => {
                record_auth_attempt("bearer", "revoked");
                tracing::warn!(target: "audit", session_id = %sid, "Token for revoked session");
                return Err(AuthError::SessionRevoked);
            }
            Err(e) => match state.config.auth.session_check {
                SessionCheckPolicy::FailOpen => {
                    tracing::warn!(
                        session_id = %sid,
                        error = %e,
                        "Session check failed; accepting token (fail open)"
                    );
                }
                SessionCheckPolicy::FailClosed => {
                    record_auth_attempt("bearer", "unavailable");
                    tracing::error!(
                        session_id = %sid,
                        error = %e,
                        "Session check failed; rejecting request (fail closed)"
                    );
                    return Err(AuthError::SessionCheckUnavailable);
                }
            },
        }
    }

    record_auth_attempt("bearer", "success");
    Ok(Principal::from_claims(claims)?)
}

//! Session handlers
//!
//! Every revocation is written to the audit log here.

use super::{RevokedResponse, SuccessResponse};
use crate::audit::{self, ClientContext};
use crate::auth::Principal;
use crate::error::{ApiPath, AppError, ErrorResponse};
use crate::middleware::metrics::record_revocations;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use vigil_core::{AuditLevel, NewAuditEvent, Session};

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionList {
    pub sessions: Vec<Session>,
    pub total: usize,
}

impl From<Vec<Session>> for SessionList {
    fn from(sessions: Vec<Session>) -> Self {
        Self {
            total: sessions.len(),
            sessions,
        }
    }
}

/// All live sessions, newest first
#[utoipa::path(
    get,
    path = "/api/sessions",
    tag = "sessions",
    responses(
        (status = 200, description = "Live sessions", body = SessionList),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionList>, AppError> {
    Ok(Json(state.sessions.list_active_sessions().await?.into()))
}

/// The caller's own live sessions
#[utoipa::path(
    get,
    path = "/api/sessions/me",
    tag = "sessions",
    responses((status = 200, description = "Live sessions", body = SessionList)),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn my_sessions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<SessionList>, AppError> {
    Ok(Json(
        state
            .sessions
            .list_user_sessions(principal.user_id)
            .await?
            .into(),
    ))
}

/// One user's live sessions
#[utoipa::path(
    get,
    path = "/api/sessions/user/{user_id}",
    tag = "sessions",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Live sessions", body = SessionList),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn user_sessions(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<Json<SessionList>, AppError> {
    Ok(Json(state.sessions.list_user_sessions(user_id).await?.into()))
}

/// Revoke one session
#[utoipa::path(
    delete,
    path = "/api/sessions/{session_id}",
    tag = "sessions",
    params(("session_id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session revoked", body = SuccessResponse),
        (status = 404, description = "Session not found or already revoked", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state
        .sessions
        .revoke_session(session_id, Some(principal.user_id))
        .await?
    {
        return Err(AppError::NotFound(
            "Session not found or already revoked".to_string(),
        ));
    }
    record_revocations("session", 1);

    state.audit.write_audit(
        NewAuditEvent::new(&principal.username, audit::SESSION_REVOKED)
            .actor(principal.user_id)
            .resource("session", session_id)
            .level(AuditLevel::Warn)
            .ip(ClientContext::from_headers(&headers).ip_address),
    );

    Ok(Json(SuccessResponse::ok()))
}

/// Emergency revocation of every live session
#[utoipa::path(
    delete,
    path = "/api/sessions",
    tag = "sessions",
    responses(
        (status = 200, description = "Sessions revoked", body = RevokedResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn revoke_all_sessions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
) -> Result<Json<RevokedResponse>, AppError> {
    let revoked = state
        .sessions
        .revoke_all_sessions(Some(principal.user_id))
        .await?;
    record_revocations("all", revoked);

    state.audit.write_audit(
        NewAuditEvent::new(&principal.username, audit::ALL_SESSIONS_REVOKED)
            .actor(principal.user_id)
            .resource("session", "*")
            .level(AuditLevel::Critical)
            .metadata(serde_json::json!({ "revoked": revoked }))
            .ip(ClientContext::from_headers(&headers).ip_address),
    );

    Ok(Json(RevokedResponse::new(revoked)))
}

/// Revoke every live session of one user
#[utoipa::path(
    delete,
    path = "/api/sessions/user/{user_id}",
    tag = "sessions",
    params(("user_id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Sessions revoked", body = RevokedResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn revoke_user_sessions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiPath(user_id): ApiPath<i64>,
) -> Result<Json<RevokedResponse>, AppError> {
    let revoked = state
        .sessions
        .revoke_all_user_sessions(user_id, Some(principal.user_id))
        .await?;
    record_revocations("user", revoked);

    state.audit.write_audit(
        NewAuditEvent::new(&principal.username, audit::USER_SESSIONS_REVOKED)
            .actor(principal.user_id)
            .resource("user", user_id)
            .level(AuditLevel::Warn)
            .metadata(serde_json::json!({ "revoked": revoked }))
            .ip(ClientContext::from_headers(&headers).ip_address),
    );

    Ok(Json(RevokedResponse::new(revoked)))
}

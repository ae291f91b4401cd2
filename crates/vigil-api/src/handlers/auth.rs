//! Authentication API handlers

use crate::audit::ClientContext;
use crate::auth::{LoginRequest, LoginResponse, LogoutResponse, Principal};
use crate::error::{ApiJson, AppError, ErrorResponse};
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Extension, Json};
use std::sync::Arc;
use vigil_core::UserPublic;

/// Login with username and password
///
/// Creates a session and returns a bearer token bound to it.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing username or password", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account suspended", body = ErrorResponse),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = state
        .auth
        .login(request, ClientContext::from_headers(&headers))
        .await?;
    Ok(Json(response))
}

/// Revoke the caller's current session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = LogoutResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, AppError> {
    let response = state
        .auth
        .logout(&principal, ClientContext::from_headers(&headers))
        .await?;
    Ok(Json(response))
}

/// Current user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserPublic),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Account no longer exists", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UserPublic>, AppError> {
    Ok(Json(state.auth.me(&principal).await?))
}

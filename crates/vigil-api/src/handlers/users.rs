//! User management handlers
//!
//! All routes here sit behind the "UserManagement" screen guard except the
//! heatmap, which is open to the user themself and to admins.

use super::SuccessResponse;
use crate::audit::{self, ClientContext};
use crate::auth::Principal;
use crate::error::{ApiJson, ApiPath, AppError, ErrorResponse};
use crate::state::AppState;
use crate::users::{BulkDeleteOutcome, CreateUserRequest, UpdateUserRequest, UserSummary};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use vigil_core::{AuditLevel, NewAuditEvent, UserPublic};

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub users: Vec<UserSummary>,
    pub total: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    pub ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkDeleteResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: BulkDeleteOutcome,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HeatmapResponse {
    pub user_id: i64,
    /// Daily login counts, oldest first, ending today
    pub days: Vec<i64>,
}

fn audit_event(principal: &Principal, action: &str, user_id: i64, headers: &HeaderMap) -> NewAuditEvent {
    NewAuditEvent::new(&principal.username, action)
        .actor(principal.user_id)
        .resource("user", user_id)
        .ip(ClientContext::from_headers(headers).ip_address)
}

/// Every user with activity and risk fields
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    responses(
        (status = 200, description = "Users", body = UserList),
        (status = 403, description = "Screen not permitted", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<UserList>, AppError> {
    let users = state.users.list_users().await?;
    Ok(Json(UserList {
        total: users.len(),
        users,
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserSummary),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<UserSummary>, AppError> {
    Ok(Json(state.users.get_user(id).await?))
}

/// Create an account
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserPublic),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Username or email already exists", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserPublic>), AppError> {
    let user = state.users.create_user(request).await?;

    state.audit.write_audit(
        audit_event(&principal, audit::USER_CREATED, user.id, &headers)
            .level(AuditLevel::Success)
            .metadata(serde_json::json!({
                "username": user.username,
                "role": user.role,
            })),
    );

    Ok((StatusCode::CREATED, Json(user.to_public())))
}

/// Partial update
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserPublic),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Email already exists", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateUserRequest>,
) -> Result<Json<UserPublic>, AppError> {
    let update = state
        .users
        .update_user(id, request, principal.user_id)
        .await?;

    let role_changed = update.previous.role != update.user.role;
    let status_changed = update.previous.status != update.user.status;
    let level = if role_changed || status_changed {
        AuditLevel::Warn
    } else {
        AuditLevel::Info
    };

    state.audit.write_audit(
        audit_event(&principal, audit::USER_UPDATED, id, &headers)
            .level(level)
            .metadata(serde_json::json!({
                "role": { "from": update.previous.role, "to": update.user.role },
                "status": { "from": update.previous.status, "to": update.user.status },
                "revoked_sessions": update.revoked_sessions,
            })),
    );

    Ok(Json(update.user.to_public()))
}

/// Soft delete one user
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted", body = SuccessResponse),
        (status = 403, description = "Protected administrator", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let user = state.users.delete_user(id).await?;

    state.audit.write_audit(
        audit_event(&principal, audit::USER_DELETED, id, &headers)
            .level(AuditLevel::Warn)
            .metadata(serde_json::json!({ "username": user.username })),
    );

    Ok(Json(SuccessResponse::ok()))
}

/// Soft delete many users; the protected administrator is skipped
#[utoipa::path(
    post,
    path = "/api/users/bulk-delete",
    tag = "users",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Users deleted", body = BulkDeleteResponse),
        (status = 400, description = "Malformed id list", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn bulk_delete_users(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    body: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    let ids = bulk_ids(body)?;
    let outcome = state.users.bulk_delete_users(&ids).await?;

    state.audit.write_audit(
        NewAuditEvent::new(&principal.username, audit::USERS_BULK_DELETED)
            .actor(principal.user_id)
            .level(AuditLevel::Warn)
            .metadata(serde_json::json!({
                "requested": ids,
                "deleted": outcome.deleted,
                "skipped": outcome.skipped,
            }))
            .ip(ClientContext::from_headers(&headers).ip_address),
    );

    Ok(Json(BulkDeleteResponse {
        success: true,
        outcome,
    }))
}

/// Any body that is not `{"ids": [..]}` with at least one integer id
/// gets the same 400
fn bulk_ids(body: Result<Json<BulkDeleteRequest>, JsonRejection>) -> Result<Vec<i64>, AppError> {
    body.ok()
        .and_then(|Json(request)| request.ids)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| AppError::BadRequest("ids must be a non-empty array of user ids".to_string()))
}

/// Set a new password for a user
#[utoipa::path(
    post,
    path = "/api/users/{id}/reset-password",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = SuccessResponse),
        (status = 400, description = "Password too short", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let password = request
        .password
        .ok_or_else(|| AppError::BadRequest("password is required".to_string()))?;
    state.users.reset_user_password(id, &password).await?;

    state.audit.write_audit(
        audit_event(&principal, audit::PASSWORD_RESET, id, &headers).level(AuditLevel::Warn),
    );

    Ok(Json(SuccessResponse::ok()))
}

/// Daily login counts for the last 28 days
#[utoipa::path(
    get,
    path = "/api/users/{id}/heatmap",
    tag = "users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Login heatmap", body = HeatmapResponse),
        (status = 403, description = "Neither the user nor an admin", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn login_heatmap(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<HeatmapResponse>, AppError> {
    if principal.user_id != id && !principal.is_admin() {
        return Err(AppError::Forbidden("Access denied".to_string()));
    }

    let days = state.users.login_heatmap(id).await?;
    Ok(Json(HeatmapResponse { user_id: id, days }))
}

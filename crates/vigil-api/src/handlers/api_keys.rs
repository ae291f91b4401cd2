//! API key handlers

use super::SuccessResponse;
use crate::audit::{self, ClientContext};
use crate::auth::{IssuedApiKey, Principal};
use crate::error::{ApiJson, ApiPath, AppError, ErrorResponse};
use crate::middleware::metrics::record_revocations;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use vigil_core::{ApiKey, AuditLevel, NewAuditEvent};

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyList {
    pub keys: Vec<ApiKey>,
    pub total: usize,
}

impl From<Vec<ApiKey>> for ApiKeyList {
    fn from(keys: Vec<ApiKey>) -> Self {
        Self {
            total: keys.len(),
            keys,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    pub name: Option<String>,
    /// Defaults to "read:all"
    pub scope: Option<String>,
}

/// All active keys
#[utoipa::path(
    get,
    path = "/api/api-keys",
    tag = "api-keys",
    responses(
        (status = 200, description = "Active keys", body = ApiKeyList),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn list_api_keys(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiKeyList>, AppError> {
    Ok(Json(state.api_keys.list_api_keys(None).await?.into()))
}

/// The caller's active keys
#[utoipa::path(
    get,
    path = "/api/api-keys/mine",
    tag = "api-keys",
    responses((status = 200, description = "Active keys", body = ApiKeyList)),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn my_api_keys(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiKeyList>, AppError> {
    Ok(Json(
        state
            .api_keys
            .list_api_keys(Some(principal.user_id))
            .await?
            .into(),
    ))
}

/// Issue a key for the caller
///
/// The response is the only place the full key ever appears.
#[utoipa::path(
    post,
    path = "/api/api-keys",
    tag = "api-keys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "Key issued", body = IssuedApiKey),
        (status = 400, description = "Missing name", body = ErrorResponse),
        (status = 403, description = "Account may not issue keys", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<IssuedApiKey>), AppError> {
    let name = request
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::BadRequest("name is required".to_string()))?
        .to_string();
    let scope = request
        .scope
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    // api_access is not carried in the token
    let owner = state
        .store
        .find_user(principal.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    if !owner.can_issue_api_keys() {
        return Err(AppError::Forbidden(
            "API key issuance is not permitted for this account".to_string(),
        ));
    }

    let issued = state
        .api_keys
        .create_api_key(owner.id, &name, scope)
        .await?;

    state.audit.write_audit(
        NewAuditEvent::new(&principal.username, audit::API_KEY_CREATED)
            .actor(principal.user_id)
            .resource("api_key", issued.record.id)
            .metadata(serde_json::json!({
                "name": issued.record.name,
                "key_prefix": issued.record.key_prefix,
                "scope": issued.record.scope,
            }))
            .ip(ClientContext::from_headers(&headers).ip_address),
    );

    Ok((StatusCode::CREATED, Json(issued)))
}

/// Revoke a key. Owners may revoke their own keys, admins any key.
#[utoipa::path(
    delete,
    path = "/api/api-keys/{id}",
    tag = "api-keys",
    params(("id" = i64, Path, description = "API key id")),
    responses(
        (status = 200, description = "Key revoked", body = SuccessResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Key not found or already revoked", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    ApiPath(key_id): ApiPath<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    let not_found = || AppError::NotFound("API key not found or already revoked".to_string());

    let key = state
        .api_keys
        .find_api_key(key_id)
        .await?
        .ok_or_else(not_found)?;
    if key.user_id != principal.user_id && !principal.is_admin() {
        return Err(AppError::Forbidden(
            "Not allowed to revoke this API key".to_string(),
        ));
    }

    if !state
        .api_keys
        .revoke_api_key(key_id, Some(principal.user_id))
        .await?
    {
        return Err(not_found());
    }
    record_revocations("api_key", 1);

    state.audit.write_audit(
        NewAuditEvent::new(&principal.username, audit::API_KEY_REVOKED)
            .actor(principal.user_id)
            .resource("api_key", key_id)
            .level(AuditLevel::Warn)
            .metadata(serde_json::json!({
                "owner_id": key.user_id,
                "key_prefix": key.key_prefix,
            }))
            .ip(ClientContext::from_headers(&headers).ip_address),
    );

    Ok(Json(SuccessResponse::ok()))
}

//! OpenAPI document

use crate::auth::{IssuedApiKey, LoginRequest, LoginResponse, LogoutResponse};
use crate::error::ErrorResponse;
use crate::handlers::{self, RevokedResponse, SuccessResponse};
use crate::users::{BulkDeleteOutcome, CreateUserRequest, UpdateUserRequest, UserSummary};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vigil API",
        description = "Session, API key, user and audit lifecycle"
    ),
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::health::prometheus_metrics,
        handlers::auth::login_handler,
        handlers::auth::logout_handler,
        handlers::auth::me_handler,
        handlers::sessions::list_sessions,
        handlers::sessions::my_sessions,
        handlers::sessions::user_sessions,
        handlers::sessions::revoke_session,
        handlers::sessions::revoke_all_sessions,
        handlers::sessions::revoke_user_sessions,
        handlers::api_keys::list_api_keys,
        handlers::api_keys::my_api_keys,
        handlers::api_keys::create_api_key,
        handlers::api_keys::revoke_api_key,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::delete_user,
        handlers::users::bulk_delete_users,
        handlers::users::reset_password,
        handlers::users::login_heatmap,
        handlers::audit::list_audit_events,
    ),
    components(schemas(
        ErrorResponse,
        SuccessResponse,
        RevokedResponse,
        LoginRequest,
        LoginResponse,
        LogoutResponse,
        IssuedApiKey,
        UserSummary,
        CreateUserRequest,
        UpdateUserRequest,
        BulkDeleteOutcome,
        handlers::health::HealthResponse,
        handlers::health::ReadinessResponse,
        handlers::health::ReadinessChecks,
        handlers::sessions::SessionList,
        handlers::api_keys::ApiKeyList,
        handlers::api_keys::CreateApiKeyRequest,
        handlers::users::UserList,
        handlers::users::BulkDeleteRequest,
        handlers::users::BulkDeleteResponse,
        handlers::users::ResetPasswordRequest,
        handlers::users::HeatmapResponse,
        vigil_core::UserPublic,
        vigil_core::Session,
        vigil_core::ApiKey,
        vigil_core::AuditEvent,
        vigil_core::AuditPage,
        vigil_core::Role,
        vigil_core::AccessLevel,
        vigil_core::Screen,
        vigil_core::UserStatus,
        vigil_core::RiskLevel,
        vigil_core::AuditLevel,
        vigil_core::ApiKeyStatus,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness, readiness and metrics"),
        (name = "auth", description = "Login, logout and current user"),
        (name = "sessions", description = "Session listing and revocation"),
        (name = "api-keys", description = "API key issuance and revocation"),
        (name = "users", description = "User management"),
        (name = "audit", description = "Audit log"),
    )
)]
pub struct ApiDoc;

/// Registers the bearer token and `X-API-Key` schemes referenced by the paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

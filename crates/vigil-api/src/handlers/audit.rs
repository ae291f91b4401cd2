//! Audit log handler

use crate::error::{ApiQuery, AppError, ErrorResponse};
use crate::state::AppState;
use axum::{extract::State, Json};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;
use vigil_core::{AuditFilter, AuditLevel, AuditPage};

/// Audit listing query
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// Exact level: info, warn, critical or success
    pub level: Option<String>,
    /// Substring of the action code, case-insensitive
    pub action: Option<String>,
    /// Substring of the actor username, case-insensitive
    pub username: Option<String>,
    /// Page size, clamped to 1..=500 (default 100)
    pub limit: Option<i64>,
    /// Rows to skip (default 0)
    pub offset: Option<i64>,
}

/// Paginated audit log, newest first
#[utoipa::path(
    get,
    path = "/api/audit",
    tag = "audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit events", body = AuditPage),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
    ),
    security(("bearer_auth" = []), ("api_key" = []))
)]
pub async fn list_audit_events(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<AuditQuery>,
) -> Result<Json<AuditPage>, AppError> {
    let level = query
        .level
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::parse::<AuditLevel>)
        .transpose()?;

    let filter = AuditFilter::new(level, query.action, query.username, query.limit, query.offset);
    Ok(Json(state.audit.list_audit_events(filter).await?))
}

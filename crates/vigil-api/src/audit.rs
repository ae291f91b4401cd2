//! Audit logging for privileged actions
//!
//! Every privileged action is appended to the audit log through
//! [`AuditLogger::write_audit`]. The write is handed to a background worker
//! and never awaited by the request that triggered it; a failed insert is
//! logged and counted, never returned to the caller. The queue is bounded:
//! when the store falls behind, new events are dropped from the store (they
//! still reach the tracing mirror) and counted.
//!
//! Each event is also mirrored to tracing with the "audit" target, making
//! them easy to filter and route to security monitoring systems even when
//! the store is unavailable.

use crate::middleware::metrics::record_background_failure;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use vigil_core::{AuditFilter, AuditLevel, AuditPage, CredentialStore, NewAuditEvent};

// Action codes written to the audit log
pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
pub const LOGIN_FAILED: &str = "LOGIN_FAILED";
pub const LOGOUT: &str = "LOGOUT";
pub const USER_CREATED: &str = "USER_CREATED";
pub const USER_UPDATED: &str = "USER_UPDATED";
pub const USER_DELETED: &str = "USER_DELETED";
pub const USERS_BULK_DELETED: &str = "USERS_BULK_DELETED";
pub const PASSWORD_RESET: &str = "PASSWORD_RESET";
pub const SESSION_REVOKED: &str = "SESSION_REVOKED";
pub const USER_SESSIONS_REVOKED: &str = "USER_SESSIONS_REVOKED";
pub const ALL_SESSIONS_REVOKED: &str = "ALL_SESSIONS_REVOKED";
pub const API_KEY_CREATED: &str = "API_KEY_CREATED";
pub const API_KEY_REVOKED: &str = "API_KEY_REVOKED";

/// Events that may wait for the store before new ones are dropped
pub const AUDIT_QUEUE_CAPACITY: usize = 1024;

enum AuditCommand {
    Write(NewAuditEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit log
///
/// Cheap to clone. Writes go through a bounded channel to a single worker
/// task, so they are applied in submission order.
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn CredentialStore>,
    tx: mpsc::Sender<AuditCommand>,
}

impl AuditLogger {
    /// Start the background writer. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_capacity(store, AUDIT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn CredentialStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(store.clone(), rx));
        Self { store, tx }
    }

    /// Append an event without waiting for the store
    pub fn write_audit(&self, event: NewAuditEvent) {
        mirror_to_tracing(&event);

        let action = event.action.clone();
        match self.tx.try_send(AuditCommand::Write(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(action = %action, "Audit queue is full; event kept in logs only");
                record_background_failure("audit_queue");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Audit worker is not running; event kept in logs only");
                record_background_failure("audit_write");
            }
        }
    }

    /// Wait until every event submitted so far has been processed
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(AuditCommand::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Filtered page of audit events, newest first
    ///
    /// `total` counts every matching row regardless of pagination.
    pub async fn list_audit_events(&self, filter: AuditFilter) -> vigil_core::Result<AuditPage> {
        let (rows, total) = tokio::try_join!(
            self.store.list_audit_events(&filter),
            self.store.count_audit_events(&filter),
        )?;

        Ok(AuditPage {
            rows,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }
}

async fn run_worker(
    store: Arc<dyn CredentialStore>,
    mut rx: mpsc::Receiver<AuditCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            AuditCommand::Write(event) => {
                let action = event.action.clone();
                if let Err(e) = store.insert_audit_event(event).await {
                    error!(action = %action, error = %e, "Failed to persist audit event");
                    record_background_failure("audit_write");
                }
            }
            AuditCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn mirror_to_tracing(event: &NewAuditEvent) {
    let metadata = event.metadata.to_string();
    match event.level {
        AuditLevel::Warn | AuditLevel::Critical => warn!(
            target: "audit",
            action = %event.action,
            level = %event.level,
            actor = %event.actor_username,
            actor_id = ?event.actor_id,
            resource_type = ?event.resource_type,
            resource_id = ?event.resource_id,
            ip_address = ?event.ip_address,
            metadata = %metadata,
            "{}",
            event.detail.as_deref().unwrap_or("")
        ),
        AuditLevel::Info | AuditLevel::Success => info!(
            target: "audit",
            action = %event.action,
            level = %event.level,
            actor = %event.actor_username,
            actor_id = ?event.actor_id,
            resource_type = ?event.resource_type,
            resource_id = ?event.resource_id,
            ip_address = ?event.ip_address,
            metadata = %metadata,
            "{}",
            event.detail.as_deref().unwrap_or("")
        ),
    }
}

/// Client details taken from request headers
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        Self {
            ip_address: extract_ip_address(headers),
            user_agent: extract_user_agent(headers),
        }
    }
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For, then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    // Take the first IP in the chain (client IP)
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    None
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

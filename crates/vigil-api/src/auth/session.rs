//! Session lifecycle
//!
//! A session is created at login and its id travels inside the bearer token
//! as `sid`. There is no cache in front of the store, so a revocation is
//! seen by the very next request carrying that token.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;
use vigil_core::{CredentialStore, NewSession, RiskLevel, Session};

/// Request context recorded with a new session
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub location: Option<String>,
    pub risk_level: RiskLevel,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn CredentialStore>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, ttl_hours: i64) -> Self {
        Self {
            store,
            ttl: Duration::hours(ttl_hours),
        }
    }

    /// Record a new live session and return its id
    ///
    /// The device label is derived from the user agent.
    pub async fn create_session(
        &self,
        user_id: i64,
        context: SessionContext,
    ) -> vigil_core::Result<Uuid> {
        let device_label = context.user_agent.as_deref().map(device_label);
        let session = self
            .store
            .insert_session(NewSession {
                user_id,
                ip_address: context.ip_address,
                user_agent: context.user_agent,
                device_label,
                location: context.location,
                risk_level: context.risk_level,
                expires_at: Utc::now() + self.ttl,
            })
            .await?;

        tracing::debug!(user_id, session_id = %session.id, "Session created");
        Ok(session.id)
    }

    /// Live check used by the authentication middleware
    pub async fn is_session_active(&self, session_id: Uuid) -> vigil_core::Result<bool> {
        self.store.is_session_live(session_id).await
    }

    pub async fn list_active_sessions(&self) -> vigil_core::Result<Vec<Session>> {
        self.store.list_live_sessions(None).await
    }

    pub async fn list_user_sessions(&self, user_id: i64) -> vigil_core::Result<Vec<Session>> {
        self.store.list_live_sessions(Some(user_id)).await
    }

    /// Returns false when the session was already inactive or never existed
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        revoked_by: Option<i64>,
    ) -> vigil_core::Result<bool> {
        self.store.revoke_session(session_id, revoked_by).await
    }

    pub async fn revoke_all_user_sessions(
        &self,
        user_id: i64,
        revoked_by: Option<i64>,
    ) -> vigil_core::Result<u64> {
        self.store.revoke_user_sessions(user_id, revoked_by).await
    }

    pub async fn revoke_all_sessions(&self, revoked_by: Option<i64>) -> vigil_core::Result<u64> {
        self.store.revoke_all_sessions(revoked_by).await
    }
}

/// Short "Browser on OS" label for a user agent string
pub fn device_label(user_agent: &str) -> String {
    let ua = user_agent.to_lowercase();

    // Order matters: Edge and Opera also advertise Chrome, Chrome advertises Safari
    let browser = if ua.contains("edg/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else if ua.contains("curl/") {
        "curl"
    } else {
        "Unknown browser"
    };

    let os = if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        "Unknown OS"
    };

    format!("{browser} on {os}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::InMemoryCredentialStore;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(InMemoryCredentialStore::new()), 8)
    }

    #[tokio::test]
    async fn test_revocation_is_idempotent() {
        let sessions = manager();
        let id = sessions
            .create_session(7, SessionContext::default())
            .await
            .unwrap();

        assert!(sessions.is_session_active(id).await.unwrap());
        assert!(sessions.revoke_session(id, Some(1)).await.unwrap());
        assert!(!sessions.revoke_session(id, Some(1)).await.unwrap());
        assert!(!sessions.is_session_active(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_active() {
        let sessions = manager();
        assert!(!sessions.is_session_active(Uuid::new_v4()).await.unwrap());
        assert!(!sessions.revoke_session(Uuid::new_v4(), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_user_sessions_empties_listing() {
        let sessions = manager();
        for _ in 0..3 {
            sessions
                .create_session(7, SessionContext::default())
                .await
                .unwrap();
        }
        let other = sessions
            .create_session(8, SessionContext::default())
            .await
            .unwrap();

        assert_eq!(sessions.list_user_sessions(7).await.unwrap().len(), 3);
        assert_eq!(sessions.revoke_all_user_sessions(7, Some(1)).await.unwrap(), 3);
        assert!(sessions.list_user_sessions(7).await.unwrap().is_empty());
        assert!(sessions.is_session_active(other).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_is_newest_first() {
        let sessions = manager();
        let first = sessions
            .create_session(7, SessionContext::default())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = sessions
            .create_session(7, SessionContext::default())
            .await
            .unwrap();

        let listed: Vec<Uuid> = sessions
            .list_active_sessions()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(listed, vec![second, first]);
    }

    #[tokio::test]
    async fn test_context_is_recorded() {
        let sessions = manager();
        sessions
            .create_session(
                7,
                SessionContext {
                    ip_address: Some("203.0.113.9".into()),
                    user_agent: Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".into()),
                    location: None,
                    risk_level: RiskLevel::Medium,
                },
            )
            .await
            .unwrap();

        let session = &sessions.list_user_sessions(7).await.unwrap()[0];
        assert_eq!(session.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(session.device_label.as_deref(), Some("Firefox on Linux"));
        assert_eq!(session.risk_level, RiskLevel::Medium);
        assert!(session.expires_at > Utc::now() + Duration::hours(7));
    }

    #[test]
    fn test_device_label() {
        assert_eq!(
            device_label(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/126.0 Safari/537.36"
            ),
            "Chrome on Windows"
        );
        assert_eq!(
            device_label(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.5 Safari/605.1.15"
            ),
            "Safari on macOS"
        );
        assert_eq!(
            device_label("Mozilla/5.0 (Windows NT 10.0) Chrome/126.0 Safari/537.36 Edg/126.0"),
            "Edge on Windows"
        );
        assert_eq!(device_label("curl/8.5.0"), "curl on Unknown OS");
    }
}

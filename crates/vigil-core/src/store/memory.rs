//! In-memory credential store
//!
//! Used by `DATABASE_URL=memory://` for local runs and by the test suites.
//! Faults can be injected per operation to exercise the failure paths
//! (audit outage, session lookup failure, usage bump failure).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::CredentialStore;
use crate::models::{
    ApiKey, ApiKeyIdentity, AuditEvent, AuditFilter, LoginActivity, NewApiKey, NewAuditEvent,
    NewSession, NewUser, Session, User, UserChanges,
};
use crate::{ApiKeyStatus, Result, VigilError, PROTECTED_USER_ID};

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFault {
    Ping,
    SessionLookup,
    AuditWrite,
    ApiKeyUsage,
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<i64, User>,
    sessions: HashMap<Uuid, Session>,
    /// Key record plus its hash
    api_keys: BTreeMap<i64, (ApiKey, String)>,
    audit: Vec<AuditEvent>,
    login_activity: BTreeMap<(i64, NaiveDate), LoginActivity>,
    last_user_id: i64,
    last_api_key_id: i64,
    last_audit_id: i64,
    faults: HashSet<StoreFault>,
}

impl MemoryState {
    fn check(&self, fault: StoreFault) -> Result<()> {
        if self.faults.contains(&fault) {
            return Err(VigilError::DatabaseError(format!(
                "Injected store fault: {fault:?}"
            )));
        }
        Ok(())
    }

    fn live_users(&self) -> impl Iterator<Item = &User> {
        self.users.values().filter(|u| u.deleted_at.is_none())
    }

    fn username_taken(&self, username: &str, exclude_id: Option<i64>) -> bool {
        self.live_users()
            .any(|u| u.username == username && Some(u.id) != exclude_id)
    }

    fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> bool {
        self.live_users()
            .any(|u| u.email == email && Some(u.id) != exclude_id)
    }

    fn revoke_where<F>(&mut self, revoked_by: Option<i64>, mut predicate: F) -> u64
    where
        F: FnMut(&Session) -> bool,
    {
        let now = Utc::now();
        let mut count = 0;
        for session in self.sessions.values_mut() {
            if session.is_active && predicate(session) {
                session.is_active = false;
                session.revoked_at = Some(now);
                session.revoked_by = revoked_by;
                count += 1;
            }
        }
        count
    }
}

/// Credential store held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    state: RwLock<MemoryState>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of the given operation fail
    pub async fn inject_fault(&self, fault: StoreFault) {
        self.state.write().await.faults.insert(fault);
    }

    pub async fn clear_fault(&self, fault: StoreFault) {
        self.state.write().await.faults.remove(&fault);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn ping(&self) -> Result<()> {
        self.state.read().await.check(StoreFault::Ping)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let state = self.state.read().await;
        let user = state.live_users().find(|u| u.id == id).cloned();
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        let user = state.live_users().find(|u| u.username == username).cloned();
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let state = self.state.read().await;
        let users = state.live_users().cloned().collect();
        Ok(users)
    }

    async fn username_taken(&self, username: &str, exclude_id: Option<i64>) -> Result<bool> {
        Ok(self.state.read().await.username_taken(username, exclude_id))
    }

    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> Result<bool> {
        Ok(self.state.read().await.email_taken(email, exclude_id))
    }

    async fn insert_user(&self, user: NewUser) -> Result<User> {
        let mut state = self.state.write().await;
        if state.username_taken(&user.username, None) {
            return Err(VigilError::Conflict("Username already exists".to_string()));
        }
        if state.email_taken(&user.email, None) {
            return Err(VigilError::Conflict("Email already exists".to_string()));
        }

        state.last_user_id += 1;
        let now = Utc::now();
        let record = User {
            id: state.last_user_id,
            access_level: user.role.access_level(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            allowed_screens: user.allowed_screens,
            mfa_enabled: user.mfa_enabled,
            api_access: user.api_access,
            data_access: user.data_access,
            status: user.status,
            department: user.department,
            location: user.location,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            deleted_at: None,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<Option<User>> {
        let mut state = self.state.write().await;
        if let Some(email) = &changes.email {
            if state.email_taken(email, Some(id)) {
                return Err(VigilError::Conflict("Email already exists".to_string()));
            }
        }

        let access_level = changes.access_level();
        let Some(user) = state
            .users
            .get_mut(&id)
            .filter(|u| u.deleted_at.is_none())
        else {
            return Ok(None);
        };

        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(level) = access_level {
            user.access_level = level;
        }
        if let Some(screens) = changes.allowed_screens {
            user.allowed_screens = screens;
        }
        if let Some(mfa) = changes.mfa_enabled {
            user.mfa_enabled = mfa;
        }
        if let Some(api_access) = changes.api_access {
            user.api_access = api_access;
        }
        if let Some(data_access) = changes.data_access {
            user.data_access = data_access;
        }
        if let Some(status) = changes.status {
            user.status = status;
        }
        if let Some(department) = changes.department {
            user.department = Some(department);
        }
        if let Some(location) = changes.location {
            user.location = Some(location);
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn soft_delete_users(&self, ids: &[i64]) -> Result<Vec<i64>> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut deleted = Vec::new();
        for id in ids {
            if *id == PROTECTED_USER_ID {
                continue;
            }
            if let Some(user) = state.users.get_mut(id) {
                if user.deleted_at.is_none() {
                    user.deleted_at = Some(now);
                    user.updated_at = now;
                    deleted.push(*id);
                }
            }
        }
        deleted.sort_unstable();
        deleted.dedup();
        Ok(deleted)
    }

    async fn set_password_hash(&self, id: i64, password_hash: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.users.get_mut(&id).filter(|u| u.deleted_at.is_none()) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn touch_last_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        let mut state = self.state.write().await;
        let record = Session {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            ip_address: session.ip_address,
            user_agent: session.user_agent,
            device_label: session.device_label,
            location: session.location,
            risk_level: session.risk_level,
            is_active: true,
            expires_at: session.expires_at,
            created_at: Utc::now(),
            revoked_at: None,
            revoked_by: None,
        };
        state.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn is_session_live(&self, id: Uuid) -> Result<bool> {
        let state = self.state.read().await;
        state.check(StoreFault::SessionLookup)?;
        let now = Utc::now();
        Ok(state
            .sessions
            .get(&id)
            .map(|s| s.is_live_at(now))
            .unwrap_or(false))
    }

    async fn list_live_sessions(&self, user_id: Option<i64>) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        let now = Utc::now();
        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.is_live_at(now))
            .filter(|s| user_id.map(|id| s.user_id == id).unwrap_or(true))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn revoke_session(&self, id: Uuid, revoked_by: Option<i64>) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state.revoke_where(revoked_by, |s| s.id == id) == 1)
    }

    async fn revoke_user_sessions(&self, user_id: i64, revoked_by: Option<i64>) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(state.revoke_where(revoked_by, |s| s.user_id == user_id))
    }

    async fn revoke_all_sessions(&self, revoked_by: Option<i64>) -> Result<u64> {
        let mut state = self.state.write().await;
        Ok(state.revoke_where(revoked_by, |_| true))
    }

    async fn live_session_counts(&self) -> Result<HashMap<i64, i64>> {
        let state = self.state.read().await;
        let now = Utc::now();
        let mut counts = HashMap::new();
        for session in state.sessions.values().filter(|s| s.is_live_at(now)) {
            *counts.entry(session.user_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn insert_api_key(&self, key: NewApiKey) -> Result<ApiKey> {
        let mut state = self.state.write().await;
        state.last_api_key_id += 1;
        let record = ApiKey {
            id: state.last_api_key_id,
            user_id: key.user_id,
            name: key.name,
            key_prefix: key.key_prefix,
            scope: key.scope,
            total_calls: 0,
            last_used_at: None,
            status: ApiKeyStatus::Active,
            created_at: Utc::now(),
            revoked_at: None,
            revoked_by: None,
        };
        state
            .api_keys
            .insert(record.id, (record.clone(), key.key_hash));
        Ok(record)
    }

    async fn find_api_key_identity(&self, key_hash: &str) -> Result<Option<ApiKeyIdentity>> {
        let state = self.state.read().await;
        let identity = state
            .api_keys
            .values()
            .find(|(key, hash)| hash == key_hash && key.status == ApiKeyStatus::Active)
            .and_then(|(key, _)| {
                state
                    .live_users()
                    .find(|u| u.id == key.user_id)
                    .map(|user| ApiKeyIdentity {
                        key_id: key.id,
                        user: user.clone(),
                    })
            });
        Ok(identity)
    }

    async fn record_api_key_usage(&self, key_id: i64) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(StoreFault::ApiKeyUsage)?;
        if let Some((key, _)) = state.api_keys.get_mut(&key_id) {
            if key.status == ApiKeyStatus::Active {
                key.total_calls += 1;
                key.last_used_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn find_api_key(&self, key_id: i64) -> Result<Option<ApiKey>> {
        let state = self.state.read().await;
        let key = state.api_keys.get(&key_id).map(|(key, _)| key.clone());
        Ok(key)
    }

    async fn list_api_keys(&self, user_id: Option<i64>) -> Result<Vec<ApiKey>> {
        let state = self.state.read().await;
        Ok(state
            .api_keys
            .values()
            .rev()
            .map(|(key, _)| key)
            .filter(|k| k.status == ApiKeyStatus::Active)
            .filter(|k| user_id.map(|id| k.user_id == id).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn revoke_api_key(&self, key_id: i64, revoked_by: Option<i64>) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.api_keys.get_mut(&key_id) {
            Some((key, _)) if key.status == ApiKeyStatus::Active => {
                key.status = ApiKeyStatus::Revoked;
                key.revoked_at = Some(Utc::now());
                key.revoked_by = revoked_by;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_audit_event(&self, event: NewAuditEvent) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(StoreFault::AuditWrite)?;
        state.last_audit_id += 1;
        let record = AuditEvent {
            id: state.last_audit_id,
            actor_id: event.actor_id,
            actor_username: event.actor_username,
            action: event.action,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            level: event.level,
            detail: event.detail,
            metadata: event.metadata,
            ip_address: event.ip_address,
            created_at: Utc::now(),
        };
        state.audit.push(record);
        Ok(())
    }

    async fn list_audit_events(&self, filter: &AuditFilter) -> Result<Vec<AuditEvent>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn count_audit_events(&self, filter: &AuditFilter) -> Result<i64> {
        let state = self.state.read().await;
        let total = state.audit.iter().filter(|e| filter.matches(e)).count();
        Ok(total as i64)
    }

    async fn record_login_activity(
        &self,
        user_id: i64,
        day: NaiveDate,
        logins: i64,
        failures: i64,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .login_activity
            .entry((user_id, day))
            .or_insert(LoginActivity {
                user_id,
                day,
                login_count: 0,
                failed_count: 0,
            });
        entry.login_count += logins;
        entry.failed_count += failures;
        Ok(())
    }

    async fn login_activity_since(&self, since: NaiveDate) -> Result<Vec<LoginActivity>> {
        let state = self.state.read().await;
        Ok(state
            .login_activity
            .values()
            .filter(|a| a.day >= since)
            .cloned()
            .collect())
    }

    async fn user_login_activity_since(
        &self,
        user_id: i64,
        since: NaiveDate,
    ) -> Result<Vec<LoginActivity>> {
        let state = self.state.read().await;
        Ok(state
            .login_activity
            .values()
            .filter(|a| a.user_id == user_id && a.day >= since)
            .cloned()
            .collect())
    }
}

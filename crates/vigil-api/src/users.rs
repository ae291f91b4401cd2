//! User management service
//!
//! CRUD over accounts. Reads are enriched with login activity, failed-login
//! counts, live session counts and a risk score, all recomputed per read.

use crate::auth::password::{hash_password_blocking, validate_password_strength, PasswordConfig};
use crate::auth::session::SessionManager;
use crate::error::AppError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;
use vigil_core::{
    CredentialStore, LoginActivity, NewUser, Role, Screen, User, UserChanges, UserPublic,
    UserStatus, DEFAULT_DATA_ACCESS, PROTECTED_USER_ID,
};

/// Days covered by the login heatmap
pub const HEATMAP_DAYS: usize = 28;

/// Trailing window for the failed-login count
pub const FAILED_LOGIN_WINDOW_DAYS: i64 = 30;

/// Days without a login before the inactivity penalty applies
const STALE_LOGIN_DAYS: i64 = 14;

/// Risk score in `0..=100`
///
/// Seven points per failed login in the window, plus twenty when the last
/// login is more than two weeks old or the account has never logged in.
pub fn risk_score(failed_logins: i64, last_login_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    let stale = match last_login_at {
        Some(at) => (now - at).num_days() > STALE_LOGIN_DAYS,
        None => true,
    };
    let score = failed_logins.max(0).saturating_mul(7) + if stale { 20 } else { 0 };
    score.min(100)
}

/// Daily login counts for the `HEATMAP_DAYS` days ending `today`, oldest first
pub fn login_heatmap(rows: &[LoginActivity], today: NaiveDate) -> Vec<i64> {
    let start = today - Duration::days(HEATMAP_DAYS as i64 - 1);
    let mut counts = vec![0; HEATMAP_DAYS];
    for row in rows {
        let offset = (row.day - start).num_days();
        if (0..HEATMAP_DAYS as i64).contains(&offset) {
            counts[offset as usize] += row.login_count;
        }
    }
    counts
}

fn failed_logins_since(rows: &[LoginActivity], since: NaiveDate) -> i64 {
    rows.iter()
        .filter(|r| r.day >= since)
        .map(|r| r.failed_count)
        .sum()
}

/// User enriched with computed activity fields
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSummary {
    #[serde(flatten)]
    pub user: UserPublic,
    /// Daily logins over the last 28 days, oldest first
    pub login_activity: Vec<i64>,
    /// Failed logins over the trailing 30 days
    pub failed_logins: i64,
    pub active_sessions: i64,
    pub risk_score: i64,
}

/// User creation payload
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    /// Defaults to the role's screens
    pub allowed_screens: Option<Vec<String>>,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub api_access: bool,
    /// Defaults to "internal"
    pub data_access: Option<String>,
    /// Defaults to "active"
    pub status: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub allowed_screens: Option<Vec<String>>,
    pub mfa_enabled: Option<bool>,
    pub api_access: Option<bool>,
    pub data_access: Option<String>,
    pub status: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
}

/// Result of an update
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub user: User,
    pub previous: User,
    /// Sessions revoked by the suspension cascade
    pub revoked_sessions: u64,
}

/// Result of a bulk delete
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BulkDeleteOutcome {
    pub deleted: Vec<i64>,
    /// Protected ids that were filtered out
    pub skipped: Vec<i64>,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn CredentialStore>,
    sessions: SessionManager,
    password: PasswordConfig,
    suspend_revokes_sessions: bool,
}

impl UserService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: SessionManager,
        password: PasswordConfig,
        suspend_revokes_sessions: bool,
    ) -> Self {
        Self {
            store,
            sessions,
            password,
            suspend_revokes_sessions,
        }
    }

    /// Every non-deleted user with activity fields
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, AppError> {
        let now = Utc::now();
        let today = now.date_naive();
        let since = today - Duration::days(FAILED_LOGIN_WINDOW_DAYS - 1);

        let (users, activity, live) = tokio::try_join!(
            self.store.list_users(),
            self.store.login_activity_since(since),
            self.store.live_session_counts(),
        )?;

        let mut by_user: HashMap<i64, Vec<LoginActivity>> = HashMap::new();
        for row in activity {
            by_user.entry(row.user_id).or_default().push(row);
        }

        Ok(users
            .iter()
            .map(|user| {
                let rows = by_user.get(&user.id).map(Vec::as_slice).unwrap_or(&[]);
                summarize(user, rows, live.get(&user.id).copied().unwrap_or(0), now)
            })
            .collect())
    }

    pub async fn get_user(&self, id: i64) -> Result<UserSummary, AppError> {
        let now = Utc::now();
        let since = now.date_naive() - Duration::days(FAILED_LOGIN_WINDOW_DAYS - 1);

        let user = self.require_user(id).await?;
        let (rows, sessions) = tokio::try_join!(
            self.store.user_login_activity_since(id, since),
            self.sessions.list_user_sessions(id),
        )?;

        Ok(summarize(&user, &rows, sessions.len() as i64, now))
    }

    /// Validate, hash and insert a new account
    ///
    /// Checks run in order: required fields, password length, role, then
    /// username and email uniqueness.
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<User, AppError> {
        let required = [
            ("username", &request.username),
            ("email", &request.email),
            ("password", &request.password),
            ("name", &request.name),
            ("role", &request.role),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map(str::trim).unwrap_or("").is_empty())
            .map(|(field, _)| *field)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let CreateUserRequest {
            username: Some(username),
            email: Some(email),
            password: Some(password),
            name: Some(name),
            role: Some(role),
            allowed_screens,
            mfa_enabled,
            api_access,
            data_access,
            status,
            department,
            location,
        } = request
        else {
            return Err(AppError::BadRequest("Missing required fields".to_string()));
        };

        validate_password_strength(&password).map_err(AppError::BadRequest)?;
        let role: Role = role.trim().parse()?;
        let username = username.trim().to_string();
        let email = validate_email(&email)?;
        let status = parse_status(status.as_deref())?.unwrap_or_default();
        let allowed_screens = match allowed_screens {
            Some(names) => parse_screens(&names)?,
            None => role.default_screens(),
        };

        if self.store.username_taken(&username, None).await? {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }
        if self.store.email_taken(&email, None).await? {
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let password_hash = hash_password_blocking(password, self.password.clone()).await?;

        let user = self
            .store
            .insert_user(NewUser {
                username,
                email,
                password_hash,
                name: name.trim().to_string(),
                role,
                allowed_screens,
                mfa_enabled,
                api_access,
                data_access: data_access.unwrap_or_else(|| DEFAULT_DATA_ACCESS.to_string()),
                status,
                department,
                location,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, role = %user.role, "User created");
        Ok(user)
    }

    /// Partial update; a role change recomputes the access level
    pub async fn update_user(
        &self,
        id: i64,
        request: UpdateUserRequest,
        actor_id: i64,
    ) -> Result<UserUpdate, AppError> {
        let previous = self.require_user(id).await?;

        let role = request.role.as_deref().map(|r| r.trim().parse::<Role>()).transpose()?;
        let status = parse_status(request.status.as_deref())?;
        let allowed_screens = request
            .allowed_screens
            .as_deref()
            .map(parse_screens)
            .transpose()?;
        let email = request.email.as_deref().map(validate_email).transpose()?;

        if let Some(email) = &email {
            if self.store.email_taken(email, Some(id)).await? {
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
        }

        let changes = UserChanges {
            name: request.name.map(|n| n.trim().to_string()),
            email,
            role,
            allowed_screens,
            mfa_enabled: request.mfa_enabled,
            api_access: request.api_access,
            data_access: request.data_access,
            status,
            department: request.department,
            location: request.location,
        };

        let user = self
            .store
            .update_user(id, changes)
            .await?
            .ok_or_else(user_not_found)?;

        let mut revoked_sessions = 0;
        if self.suspend_revokes_sessions
            && previous.status != UserStatus::Suspended
            && user.status == UserStatus::Suspended
        {
            revoked_sessions = self
                .sessions
                .revoke_all_user_sessions(id, Some(actor_id))
                .await?;
            tracing::info!(user_id = id, revoked_sessions, "Suspension revoked live sessions");
        }

        Ok(UserUpdate {
            user,
            previous,
            revoked_sessions,
        })
    }

    /// Soft delete one user. The protected administrator is refused.
    pub async fn delete_user(&self, id: i64) -> Result<User, AppError> {
        if id == PROTECTED_USER_ID {
            return Err(AppError::Forbidden(
                "The system administrator cannot be deleted".to_string(),
            ));
        }

        let user = self.require_user(id).await?;
        let deleted = self.store.soft_delete_users(&[id]).await?;
        if deleted.is_empty() {
            return Err(user_not_found());
        }
        Ok(user)
    }

    /// Soft delete many users, silently skipping the protected administrator
    pub async fn bulk_delete_users(&self, ids: &[i64]) -> Result<BulkDeleteOutcome, AppError> {
        if ids.is_empty() {
            return Err(AppError::BadRequest(
                "ids must be a non-empty array of user ids".to_string(),
            ));
        }

        let skipped: Vec<i64> = ids
            .iter()
            .copied()
            .filter(|id| *id == PROTECTED_USER_ID)
            .take(1)
            .collect();
        let deleted = self.store.soft_delete_users(ids).await?;

        Ok(BulkDeleteOutcome { deleted, skipped })
    }

    /// Replace the password hash. The new secret is never returned.
    pub async fn reset_user_password(&self, id: i64, password: &str) -> Result<User, AppError> {
        validate_password_strength(password).map_err(AppError::BadRequest)?;
        let user = self.require_user(id).await?;

        let password_hash = hash_password_blocking(password.to_string(), self.password.clone()).await?;
        if !self.store.set_password_hash(id, &password_hash).await? {
            return Err(user_not_found());
        }
        Ok(user)
    }

    /// Daily login counts for the last 28 days, oldest first
    pub async fn login_heatmap(&self, id: i64) -> Result<Vec<i64>, AppError> {
        self.require_user(id).await?;
        let today = Utc::now().date_naive();
        let since = today - Duration::days(HEATMAP_DAYS as i64 - 1);
        let rows = self.store.user_login_activity_since(id, since).await?;
        Ok(login_heatmap(&rows, today))
    }

    async fn require_user(&self, id: i64) -> Result<User, AppError> {
        self.store.find_user(id).await?.ok_or_else(user_not_found)
    }
}

fn summarize(user: &User, rows: &[LoginActivity], active_sessions: i64, now: DateTime<Utc>) -> UserSummary {
    let today = now.date_naive();
    let failed_logins =
        failed_logins_since(rows, today - Duration::days(FAILED_LOGIN_WINDOW_DAYS - 1));

    UserSummary {
        user: user.to_public(),
        login_activity: login_heatmap(rows, today),
        failed_logins,
        active_sessions,
        risk_score: risk_score(failed_logins, user.last_login_at, now),
    }
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

fn parse_status(status: Option<&str>) -> Result<Option<UserStatus>, AppError> {
    Ok(status.map(|s| s.trim().parse::<UserStatus>()).transpose()?)
}

fn parse_screens(names: &[String]) -> Result<Vec<Screen>, AppError> {
    let mut screens = Vec::with_capacity(names.len());
    for name in names {
        let screen: Screen = name.trim().parse()?;
        if !screens.contains(&screen) {
            screens.push(screen);
        }
    }
    Ok(screens)
}

fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email.to_string()),
        _ => Err(AppError::BadRequest("Invalid email address".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use vigil_core::InMemoryCredentialStore;

    fn fast_password() -> PasswordConfig {
        PasswordConfig {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    fn service(store: Arc<InMemoryCredentialStore>, cascade: bool) -> UserService {
        let sessions = SessionManager::new(store.clone(), 8);
        UserService::new(store, sessions, fast_password(), cascade)
    }

    fn create_request(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: Some(username.to_string()),
            email: Some(format!("{username}@example.com")),
            password: Some("long enough".to_string()),
            name: Some(username.to_string()),
            role: Some("analyst".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_risk_score_example() {
        let now = Utc::now();
        assert_eq!(risk_score(5, Some(now - Duration::days(20)), now), 55);
        assert_eq!(risk_score(0, Some(now - Duration::days(2)), now), 0);
        assert_eq!(risk_score(0, None, now), 20);
        assert_eq!(risk_score(40, None, now), 100);
    }

    proptest! {
        #[test]
        fn prop_risk_score_bounded(failed in 0i64..10_000, days in 0i64..400) {
            let now = Utc::now();
            let score = risk_score(failed, Some(now - Duration::days(days)), now);
            prop_assert!((0..=100).contains(&score));
        }

        #[test]
        fn prop_risk_score_monotonic_in_failures(failed in 0i64..20, days in 0i64..60) {
            let now = Utc::now();
            let last = Some(now - Duration::days(days));
            prop_assert!(risk_score(failed + 1, last, now) >= risk_score(failed, last, now));
        }
    }

    #[test]
    fn test_heatmap_is_zero_padded() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 28).unwrap();
        let rows = vec![
            LoginActivity { user_id: 1, day: today, login_count: 3, failed_count: 0 },
            LoginActivity {
                user_id: 1,
                day: today - Duration::days(27),
                login_count: 1,
                failed_count: 2,
            },
            LoginActivity {
                user_id: 1,
                day: today - Duration::days(28),
                login_count: 9,
                failed_count: 0,
            },
        ];

        let heatmap = login_heatmap(&rows, today);
        assert_eq!(heatmap.len(), HEATMAP_DAYS);
        assert_eq!(heatmap[0], 1);
        assert_eq!(heatmap[27], 3);
        assert_eq!(heatmap.iter().sum::<i64>(), 4);
    }

    #[tokio::test]
    async fn test_create_user_validation_order() {
        let users = service(Arc::new(InMemoryCredentialStore::new()), false);

        let err = users.create_user(CreateUserRequest::default()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required fields: username, email, password, name, role"
        );

        let mut request = create_request("bob");
        request.password = Some("short".to_string());
        request.role = Some("root".to_string());
        let err = users.create_user(request).await.unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 8 characters");

        let mut request = create_request("bob");
        request.role = Some("root".to_string());
        let err = users.create_user(request).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid role: root");
    }

    #[tokio::test]
    async fn test_create_user_uniqueness() {
        let users = service(Arc::new(InMemoryCredentialStore::new()), false);
        let bob = users.create_user(create_request("bob")).await.unwrap();
        assert_eq!(bob.access_level, vigil_core::AccessLevel::Read);
        assert_eq!(bob.allowed_screens, Role::Analyst.default_screens());
        assert!(bob.password_hash.starts_with("$argon2id$"));

        let err = users.create_user(create_request("bob")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Username already exists"));

        let mut request = create_request("robert");
        request.email = Some("bob@example.com".to_string());
        let err = users.create_user(request).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Email already exists"));
    }

    #[tokio::test]
    async fn test_update_recomputes_access_level() {
        let users = service(Arc::new(InMemoryCredentialStore::new()), false);
        let bob = users.create_user(create_request("bob")).await.unwrap();

        let update = users
            .update_user(
                bob.id,
                UpdateUserRequest {
                    role: Some("admin".to_string()),
                    ..Default::default()
                },
                bob.id,
            )
            .await
            .unwrap();
        assert_eq!(update.user.role, Role::Admin);
        assert_eq!(update.user.access_level, vigil_core::AccessLevel::Write);
        assert_eq!(update.user.name, "bob");
    }

    #[tokio::test]
    async fn test_update_email_uniqueness_excludes_self() {
        let users = service(Arc::new(InMemoryCredentialStore::new()), false);
        let bob = users.create_user(create_request("bob")).await.unwrap();
        users.create_user(create_request("carol")).await.unwrap();

        let same = UpdateUserRequest {
            email: Some("bob@example.com".to_string()),
            ..Default::default()
        };
        assert!(users.update_user(bob.id, same, bob.id).await.is_ok());

        let taken = UpdateUserRequest {
            email: Some("carol@example.com".to_string()),
            ..Default::default()
        };
        let err = users.update_user(bob.id, taken, bob.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_suspension_cascade_is_opt_in() {
        let suspend = || UpdateUserRequest {
            status: Some("suspended".to_string()),
            ..Default::default()
        };

        let store = Arc::new(InMemoryCredentialStore::new());
        let users = service(store.clone(), false);
        let bob = users.create_user(create_request("bob")).await.unwrap();
        let sessions = SessionManager::new(store.clone(), 8);
        sessions.create_session(bob.id, Default::default()).await.unwrap();

        let update = users.update_user(bob.id, suspend(), 1).await.unwrap();
        assert_eq!(update.revoked_sessions, 0);
        assert_eq!(sessions.list_user_sessions(bob.id).await.unwrap().len(), 1);

        let store = Arc::new(InMemoryCredentialStore::new());
        let users = service(store.clone(), true);
        let bob = users.create_user(create_request("bob")).await.unwrap();
        let sessions = SessionManager::new(store.clone(), 8);
        sessions.create_session(bob.id, Default::default()).await.unwrap();

        let update = users.update_user(bob.id, suspend(), 1).await.unwrap();
        assert_eq!(update.revoked_sessions, 1);
        assert!(sessions.list_user_sessions(bob.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_protected_user_survives_deletes() {
        let users = service(Arc::new(InMemoryCredentialStore::new()), false);
        let admin = users.create_user(create_request("root")).await.unwrap();
        assert_eq!(admin.id, PROTECTED_USER_ID);
        let mut ids = vec![];
        for name in ["u2", "u3", "u4", "u5", "u6", "u7", "u8", "u9"] {
            ids.push(users.create_user(create_request(name)).await.unwrap().id);
        }

        let err = users.delete_user(1).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let outcome = users.bulk_delete_users(&[1, 7, 9]).await.unwrap();
        assert_eq!(outcome.deleted, vec![7, 9]);
        assert_eq!(outcome.skipped, vec![1]);

        assert!(users.get_user(1).await.is_ok());
        assert!(matches!(users.get_user(7).await, Err(AppError::NotFound(_))));
        assert!(matches!(users.delete_user(7).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bulk_delete_requires_ids() {
        let users = service(Arc::new(InMemoryCredentialStore::new()), false);
        let err = users.bulk_delete_users(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "ids must be a non-empty array of user ids");
    }

    #[tokio::test]
    async fn test_reset_password() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let users = service(store.clone(), false);
        let bob = users.create_user(create_request("bob")).await.unwrap();

        assert!(matches!(
            users.reset_user_password(bob.id, "short").await,
            Err(AppError::BadRequest(_))
        ));

        users.reset_user_password(bob.id, "brand new secret").await.unwrap();
        let stored = store.find_user(bob.id).await.unwrap().unwrap();
        assert!(crate::auth::verify_password("brand new secret", &stored.password_hash).unwrap());
        assert!(!crate::auth::verify_password("long enough", &stored.password_hash).unwrap());
    }

    #[tokio::test]
    async fn test_list_users_enrichment() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let users = service(store.clone(), false);
        let bob = users.create_user(create_request("bob")).await.unwrap();
        let today = Utc::now().date_naive();
        store.record_login_activity(bob.id, today, 2, 0).await.unwrap();
        store
            .record_login_activity(bob.id, today - Duration::days(3), 0, 5)
            .await
            .unwrap();
        store
            .touch_last_login(bob.id, Utc::now() - Duration::days(20))
            .await
            .unwrap();
        SessionManager::new(store.clone(), 8)
            .create_session(bob.id, Default::default())
            .await
            .unwrap();

        let listed = users.list_users().await.unwrap();
        assert_eq!(listed.len(), 1);
        let summary = &listed[0];
        assert_eq!(summary.login_activity.len(), HEATMAP_DAYS);
        assert_eq!(summary.login_activity[HEATMAP_DAYS - 1], 2);
        assert_eq!(summary.failed_logins, 5);
        assert_eq!(summary.active_sessions, 1);
        assert_eq!(summary.risk_score, 55);
    }
}

//! Vigil API - session and credential lifecycle server
//!
//! Provides HTTP endpoints for login, session and API key revocation, user
//! management and the audit log.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod users;

use axum::{http::HeaderValue, routing::get, Json, Router};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::prometheus_metrics))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api", routes::api_routes(state.clone()))
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::openapi())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new().allow_origin(origins)
    };
    layer.allow_methods(Any).allow_headers(Any)
}

/// Helpers for integration tests: an in-memory store, fast password
/// hashing and seeded accounts.
#[cfg(feature = "test-utils")]
pub mod testing {
    use crate::auth::password::hash_password_with_config;
    use crate::auth::{generate_access_token, PasswordConfig, SessionContext};
    use crate::state::AppState;
    use axum::Router;
    use std::sync::Arc;
    use uuid::Uuid;
    use vigil_core::{
        AppConfig, CredentialStore, InMemoryCredentialStore, NewUser, Role, User, UserStatus,
        DEFAULT_DATA_ACCESS,
    };

    /// Password shared by every seeded account
    pub const TEST_PASSWORD: &str = "correct horse battery";

    pub fn fast_password_config() -> PasswordConfig {
        PasswordConfig {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub store: Arc<InMemoryCredentialStore>,
        /// Protected super admin, id 1
        pub admin: User,
        /// Developer with API access
        pub bob: User,
        /// Viewer without API access
        pub carol: User,
    }

    impl TestApp {
        pub async fn new() -> Self {
            Self::with_config(AppConfig::default()).await
        }

        pub async fn with_config(config: AppConfig) -> Self {
            let store = Arc::new(InMemoryCredentialStore::new());
            let state = Arc::new(AppState::with_password_config(
                config,
                store.clone(),
                fast_password_config(),
            ));

            let admin = seed(&store, "admin", Role::SuperAdmin, true).await;
            let bob = seed(&store, "bob", Role::Developer, true).await;
            let carol = seed(&store, "carol", Role::Viewer, false).await;

            Self {
                state,
                store,
                admin,
                bob,
                carol,
            }
        }

        pub fn router(&self) -> Router {
            crate::create_router(self.state.clone())
        }

        /// Insert an active user whose password is [`TEST_PASSWORD`]
        pub async fn seed_user(&self, username: &str, role: Role, api_access: bool) -> User {
            seed(&self.store, username, role, api_access).await
        }

        /// Open a session for `user` and return a bearer token bound to it
        pub async fn login(&self, user: &User) -> (String, Uuid) {
            let session_id = self
                .state
                .sessions
                .create_session(user.id, SessionContext::default())
                .await
                .expect("create session");
            let token = generate_access_token(&self.state.jwt, user, Some(session_id))
                .expect("sign token");
            (token, session_id)
        }
    }

    async fn seed(
        store: &InMemoryCredentialStore,
        username: &str,
        role: Role,
        api_access: bool,
    ) -> User {
        let password_hash = hash_password_with_config(TEST_PASSWORD, &fast_password_config())
            .expect("hash test password");
        store
            .insert_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash,
                name: username.to_string(),
                role,
                allowed_screens: role.default_screens(),
                mfa_enabled: false,
                api_access,
                data_access: DEFAULT_DATA_ACCESS.to_string(),
                status: UserStatus::Active,
                department: None,
                location: None,
            })
            .await
            .expect("seed user")
    }
}

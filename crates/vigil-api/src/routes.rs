//! API route definitions

use crate::auth::{auth_middleware, require_roles, require_screen};
use crate::handlers::{api_keys, audit, auth, sessions, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use vigil_core::{Screen, ADMIN_ROLES};

/// Create routes mounted under `/api`
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new().route("/auth/login", post(auth::login_handler));

    // Protected routes. Guards sit on each route, inside the authentication layer.
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        // Sessions
        .route(
            "/sessions",
            get(sessions::list_sessions)
                .delete(sessions::revoke_all_sessions)
                .layer(middleware::from_fn(require_roles(ADMIN_ROLES))),
        )
        .route("/sessions/me", get(sessions::my_sessions))
        .route(
            "/sessions/user/:user_id",
            get(sessions::user_sessions)
                .delete(sessions::revoke_user_sessions)
                .layer(middleware::from_fn(require_roles(ADMIN_ROLES))),
        )
        .route(
            "/sessions/:session_id",
            delete(sessions::revoke_session)
                .layer(middleware::from_fn(require_roles(ADMIN_ROLES))),
        )
        // API keys
        .route(
            "/api-keys",
            get(api_keys::list_api_keys).layer(middleware::from_fn(require_roles(ADMIN_ROLES))),
        )
        .route("/api-keys", post(api_keys::create_api_key))
        .route("/api-keys/mine", get(api_keys::my_api_keys))
        .route("/api-keys/:id", delete(api_keys::revoke_api_key))
        // Users
        .route(
            "/users",
            get(users::list_users)
                .post(users::create_user)
                .layer(middleware::from_fn(require_screen(Screen::UserManagement))),
        )
        .route(
            "/users/bulk-delete",
            post(users::bulk_delete_users)
                .layer(middleware::from_fn(require_screen(Screen::UserManagement))),
        )
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user)
                .layer(middleware::from_fn(require_screen(Screen::UserManagement))),
        )
        .route(
            "/users/:id/reset-password",
            post(users::reset_password)
                .layer(middleware::from_fn(require_screen(Screen::UserManagement))),
        )
        .route("/users/:id/heatmap", get(users::login_heatmap))
        // Audit
        .route(
            "/audit",
            get(audit::list_audit_events).layer(middleware::from_fn(require_roles(ADMIN_ROLES))),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    // Combine routes
    Router::new().merge(public_routes).merge(protected_routes)
}

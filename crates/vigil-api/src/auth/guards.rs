//! Route guards
//!
//! Stateless predicates over the [`Principal`] placed in request extensions
//! by the authentication middleware. They never touch the store. Attach them
//! per route, inside the authentication layer:
//!
//! ```ignore
//! Router::new()
//!     .route(
//!         "/sessions",
//!         get(list_sessions).layer(middleware::from_fn(require_roles(ADMIN_ROLES))),
//!     )
//!     .route_layer(middleware::from_fn_with_state(state, auth_middleware));
//! ```

use super::middleware::{AuthError, Principal};
use axum::{body::Body, extract::Request, middleware::Next, response::Response};
use std::{future::Future, pin::Pin};
use vigil_core::{Role, Screen};

/// Type alias for guard middleware future
type GuardFuture = Pin<Box<dyn Future<Output = Result<Response, AuthError>> + Send>>;

/// Allow only principals whose role is in `allowed`
pub fn require_roles(
    allowed: &'static [Role],
) -> impl Fn(Request<Body>, Next) -> GuardFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let principal = principal(&request)?;

            if !allowed.contains(&principal.role) {
                tracing::warn!(
                    target: "audit",
                    user_id = principal.user_id,
                    username = %principal.username,
                    role = %principal.role,
                    path = %request.uri().path(),
                    "Role not permitted"
                );
                return Err(AuthError::InsufficientRole);
            }

            Ok(next.run(request).await)
        })
    }
}

/// Allow only principals whose allowed screens include `screen`
pub fn require_screen(screen: Screen) -> impl Fn(Request<Body>, Next) -> GuardFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            let principal = principal(&request)?;

            if !principal.can_view(screen) {
                tracing::warn!(
                    target: "audit",
                    user_id = principal.user_id,
                    username = %principal.username,
                    screen = %screen,
                    path = %request.uri().path(),
                    "Screen not permitted"
                );
                return Err(AuthError::AccessDenied);
            }

            Ok(next.run(request).await)
        })
    }
}

fn principal(request: &Request<Body>) -> Result<&Principal, AuthError> {
    request
        .extensions()
        .get::<Principal>()
        .ok_or(AuthError::MissingCredential)
}

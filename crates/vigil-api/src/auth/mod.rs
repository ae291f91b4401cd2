//! Authentication and authorization module
//!
//! - Token generation and validation
//! - Password hashing with Argon2 and API key digests
//! - Session and API key lifecycle
//! - Middleware for request authentication, plus role and screen guards
//! - Login service

pub mod api_key;
pub mod guards;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;
pub mod session;

pub use api_key::{ApiKeyManager, IssuedApiKey};
pub use guards::{require_roles, require_screen};
pub use jwt::{generate_access_token, validate_access_token, Claims, JwtConfig};
pub use middleware::{auth_middleware, AuthError, AuthMethod, Principal};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordConfig};
pub use service::{AuthService, LoginRequest, LoginResponse, LogoutResponse};
pub use session::{SessionContext, SessionManager};

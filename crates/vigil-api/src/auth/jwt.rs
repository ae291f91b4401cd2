//! JWT token generation and validation
//!
//! Implements bearer tokens signed with HMAC-SHA256. The token payload is the
//! principal: it carries the user's role, screens and access level, plus the
//! `sid` of the session created at login so revocation can be checked.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;
use vigil_core::{AccessLevel, AuthConfig, Role, Screen, User};

/// JWT Claims structure containing user information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - unique token identifier
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    pub username: String,
    pub role: Role,
    pub allowed_screens: Vec<Screen>,
    pub access_level: AccessLevel,
    /// Session created at login. Tokens without one skip the revocation check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
}

impl Claims {
    /// Numeric user id carried in `sub`
    pub fn user_id(&self) -> Result<i64, JwtError> {
        self.sub.parse().map_err(|_| JwtError::InvalidToken)
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Access token expiration time in seconds
    pub access_expiration_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            secret: auth.jwt_secret.clone(),
            access_expiration_secs: auth.access_expiration_secs,
            issuer: auth.jwt_issuer.clone(),
        }
    }
}

/// Generate an access token for an authenticated user
pub fn generate_access_token(
    config: &JwtConfig,
    user: &User,
    session_id: Option<Uuid>,
) -> Result<String, JwtError> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

    let claims = Claims {
        iss: config.issuer.clone(),
        sub: user.id.to_string(),
        jti: Uuid::new_v4().to_string(),
        iat: now,
        exp: now + config.access_expiration_secs,
        username: user.username.clone(),
        role: user.role,
        allowed_screens: user.allowed_screens.clone(),
        access_level: user.access_level,
        sid: session_id,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;

    Ok(token)
}

/// Validate an access token and extract claims
pub fn validate_access_token(config: &JwtConfig, token: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        _ => JwtError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_core::UserStatus;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: 42,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            name: "Alice".to_string(),
            role: Role::Analyst,
            access_level: AccessLevel::Read,
            allowed_screens: vec![Screen::Dashboard, Screen::Alerts],
            mfa_enabled: false,
            api_access: false,
            data_access: "internal".to_string(),
            status: UserStatus::Active,
            department: None,
            location: None,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let config = JwtConfig::default();
        let sid = Uuid::new_v4();

        let token = generate_access_token(&config, &sample_user(), Some(sid)).unwrap();
        let claims = validate_access_token(&config, &token).unwrap();

        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Analyst);
        assert_eq!(claims.allowed_screens, vec![Screen::Dashboard, Screen::Alerts]);
        assert_eq!(claims.access_level, AccessLevel::Read);
        assert_eq!(claims.sid, Some(sid));
        assert_eq!(claims.iss, "vigil");
    }

    #[test]
    fn test_token_without_session() {
        let config = JwtConfig::default();
        let token = generate_access_token(&config, &sample_user(), None).unwrap();
        let claims = validate_access_token(&config, &token).unwrap();
        assert_eq!(claims.sid, None);
    }

    #[test]
    fn test_invalid_token() {
        let config = JwtConfig::default();
        let result = validate_access_token(&config, "invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = JwtConfig {
            secret: "secret1".to_string(),
            ..Default::default()
        };
        let config2 = JwtConfig {
            secret: "secret2".to_string(),
            ..Default::default()
        };

        let token = generate_access_token(&config1, &sample_user(), None).unwrap();

        let result = validate_access_token(&config2, &token);
        assert!(matches!(result, Err(JwtError::InvalidSignature)));
    }

    #[test]
    fn test_wrong_issuer() {
        let config1 = JwtConfig {
            issuer: "someone-else".to_string(),
            ..Default::default()
        };
        let token = generate_access_token(&config1, &sample_user(), None).unwrap();
        assert!(validate_access_token(&JwtConfig::default(), &token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let config = JwtConfig::default();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let claims = Claims {
            iss: config.issuer.clone(),
            sub: "42".to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now - 7200,
            exp: now - 3600,
            username: "alice".to_string(),
            role: Role::Viewer,
            allowed_screens: vec![],
            access_level: AccessLevel::Read,
            sid: None,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap();

        let result = validate_access_token(&config, &token);
        assert!(matches!(result, Err(JwtError::ExpiredToken)));
    }
}

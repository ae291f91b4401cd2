/// Password and API key secret hashing
///
/// Passwords use Argon2id with a random salt (PHC string output). API key
/// secrets are high-entropy random strings, so a single SHA-256 digest is
/// enough to make the stored form useless to an attacker while keeping the
/// per-request lookup cheap.
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Number of leading plaintext characters stored as the key prefix
pub const API_KEY_PREFIX_LEN: usize = 12;

/// Random bytes behind each API key
const API_KEY_ENTROPY_BYTES: usize = 32;

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Failed to verify password: {0}")]
    VerificationFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Password hashing configuration
///
/// Increasing memory or iterations improves resistance to offline attacks but
/// slows down every login.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KB (default: 65536 = 64 MB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism (threads, default: 4)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Hash a plaintext password using Argon2id with the default parameters
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_config(password, &PasswordConfig::default())
}

/// Hash a password with custom configuration
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = config.to_params()?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored PHC hash
///
/// Parameters are read from the hash itself, so hashes produced with any
/// [`PasswordConfig`] verify here.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerificationFailed(e.to_string())),
    }
}

/// [`hash_password_with_config`] on the blocking thread pool
pub async fn hash_password_blocking(
    password: String,
    config: PasswordConfig,
) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
        .await
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?
}

/// [`verify_password`] on the blocking thread pool
pub async fn verify_password_blocking(
    password: String,
    hash: String,
) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| PasswordError::VerificationFailed(e.to_string()))?
}

/// Validate a new password
///
/// Length is the only rule. Returns the message shown to the caller.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        ));
    }
    Ok(())
}

/// Freshly generated API key secret
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// Full secret, shown to the caller once
    pub plaintext: String,
    /// Leading characters kept for display
    pub prefix: String,
    /// Hex SHA-256 of the plaintext, the only persisted form
    pub hash: String,
}

/// Generate a new API key carrying the given tag
pub fn generate_api_key(tag: &str) -> GeneratedApiKey {
    let mut bytes = [0u8; API_KEY_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    let plaintext = format!("{tag}{}", URL_SAFE_NO_PAD.encode(bytes));
    let prefix = plaintext.chars().take(API_KEY_PREFIX_LEN).collect();
    let hash = hash_api_key(&plaintext);

    GeneratedApiKey {
        plaintext,
        prefix,
        hash,
    }
}

/// Hex-encoded SHA-256 digest of an API key
pub fn hash_api_key(raw_key: &str) -> String {
    format!("{:x}", Sha256::digest(raw_key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PasswordConfig {
        PasswordConfig {
            memory_cost: 8192,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    #[test]
    fn test_hash_and_verify_password() {
        let password = "correct horse battery";
        let hash = hash_password_with_config(password, &fast_config()).unwrap();

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong horse battery", &hash).unwrap());
    }

    #[test]
    fn test_same_password_produces_different_hashes() {
        let password = "SamePassword123!";

        let hash1 = hash_password_with_config(password, &fast_config()).unwrap();
        let hash2 = hash_password_with_config(password, &fast_config()).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password(password, &hash1).unwrap());
        assert!(verify_password(password, &hash2).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "invalid-hash-format");
        assert!(matches!(result, Err(PasswordError::InvalidHashFormat)));
    }

    #[test]
    fn test_custom_config_is_encoded_in_hash() {
        let hash = hash_password_with_config("TestPassword123!", &fast_config()).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("m=8192"));
        assert!(hash.contains("t=1"));
    }

    #[tokio::test]
    async fn test_blocking_helpers() {
        let hash = hash_password_blocking("longenough".to_string(), fast_config())
            .await
            .unwrap();
        assert!(verify_password_blocking("longenough".to_string(), hash)
            .await
            .unwrap());
    }

    #[test]
    fn test_password_length_rule() {
        assert_eq!(
            validate_password_strength("short").unwrap_err(),
            "Password must be at least 8 characters"
        );
        assert!(validate_password_strength("12345678").is_ok());
        assert!(validate_password_strength("ñññññññ").is_err());
    }

    #[test]
    fn test_generated_api_key_shape() {
        let key = generate_api_key("vgl_");

        assert!(key.plaintext.starts_with("vgl_"));
        assert_eq!(key.prefix.len(), API_KEY_PREFIX_LEN);
        assert!(key.plaintext.starts_with(&key.prefix));
        assert_eq!(key.hash, hash_api_key(&key.plaintext));
        assert_eq!(key.hash.len(), 64);
        assert!(!key.hash.contains(&key.plaintext));
    }

    #[test]
    fn test_api_keys_are_unique() {
        let a = generate_api_key("vgl_");
        let b = generate_api_key("vgl_");
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_api_key_is_deterministic() {
        assert_eq!(hash_api_key("vgl_abc"), hash_api_key("vgl_abc"));
        assert_ne!(hash_api_key("vgl_abc"), hash_api_key("vgl_abd"));
    }
}

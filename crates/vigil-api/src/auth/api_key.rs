//! API key issuance and verification
//!
//! The plaintext key exists only in the response to the issuing request.
//! The store keeps a SHA-256 digest and a short display prefix; lookups hash
//! the presented key and match on the digest.

use super::password::{generate_api_key, hash_api_key};
use crate::middleware::metrics::record_background_failure;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use vigil_core::{ApiKey, CredentialStore, NewApiKey, User, DEFAULT_API_KEY_SCOPE};

/// A freshly issued key
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedApiKey {
    /// Full secret. Returned exactly once.
    pub key: String,
    #[serde(flatten)]
    pub record: ApiKey,
}

#[derive(Clone)]
pub struct ApiKeyManager {
    store: Arc<dyn CredentialStore>,
    tag: String,
}

impl ApiKeyManager {
    pub fn new(store: Arc<dyn CredentialStore>, tag: impl Into<String>) -> Self {
        Self {
            store,
            tag: tag.into(),
        }
    }

    /// Issue a key for `user_id`. Scope defaults to "read:all".
    pub async fn create_api_key(
        &self,
        user_id: i64,
        name: &str,
        scope: Option<&str>,
    ) -> vigil_core::Result<IssuedApiKey> {
        let generated = generate_api_key(&self.tag);
        let record = self
            .store
            .insert_api_key(NewApiKey {
                user_id,
                name: name.to_string(),
                key_prefix: generated.prefix,
                key_hash: generated.hash,
                scope: scope.unwrap_or(DEFAULT_API_KEY_SCOPE).to_string(),
            })
            .await?;

        Ok(IssuedApiKey {
            key: generated.plaintext,
            record,
        })
    }

    /// Resolve a presented key to its owner
    ///
    /// Only active keys whose owner is not soft-deleted match. A match by an
    /// active owner schedules the usage bump on a detached task; its outcome
    /// never affects this result. Keys of suspended owners still resolve so
    /// the caller can answer 403, but their usage is not counted.
    pub async fn authenticate_api_key(&self, raw_key: &str) -> vigil_core::Result<Option<User>> {
        let Some(identity) = self.store.find_api_key_identity(&hash_api_key(raw_key)).await? else {
            return Ok(None);
        };

        if identity.user.is_active() {
            let store = self.store.clone();
            let key_id = identity.key_id;
            tokio::spawn(async move {
                if let Err(e) = store.record_api_key_usage(key_id).await {
                    tracing::warn!(key_id, error = %e, "Failed to record API key usage");
                    record_background_failure("api_key_usage");
                }
            });
        }

        Ok(Some(identity.user))
    }

    /// Active keys, newest first. Never includes hashes.
    pub async fn list_api_keys(&self, user_id: Option<i64>) -> vigil_core::Result<Vec<ApiKey>> {
        self.store.list_api_keys(user_id).await
    }

    pub async fn find_api_key(&self, key_id: i64) -> vigil_core::Result<Option<ApiKey>> {
        self.store.find_api_key(key_id).await
    }

    /// Returns false when the key was already revoked or never existed
    pub async fn revoke_api_key(
        &self,
        key_id: i64,
        revoked_by: Option<i64>,
    ) -> vigil_core::Result<bool> {
        self.store.revoke_api_key(key_id, revoked_by).await
    }
}

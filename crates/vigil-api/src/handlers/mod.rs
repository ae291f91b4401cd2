//! API handlers

pub mod api_keys;
pub mod audit;
pub mod auth;
pub mod health;
pub mod sessions;
pub mod users;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Plain acknowledgement
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Result of a bulk revocation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokedResponse {
    pub success: bool,
    /// Number of credentials that were live and are now revoked
    pub revoked: u64,
}

impl RevokedResponse {
    pub fn new(revoked: u64) -> Self {
        Self {
            success: true,
            revoked,
        }
    }
}

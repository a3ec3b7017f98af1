//! Token pair handed back to clients.

use serde::{Deserialize, Serialize};

pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Result of a login or refresh. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Configured access token lifetime, e.g. "15m"
    pub access_token_expires_in: String,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String, expires_in: &str) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            access_token_expires_in: expires_in.to_string(),
        }
    }
}

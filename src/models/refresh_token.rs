//! Refresh token record.
//!
//! One record per issued refresh token. Only the fingerprint of the secret
//! is stored; the raw secret goes to the client once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRecord {
    pub id: String,
    pub user_id: String,
    /// Keyed hash of the secret, used as the lookup key
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    /// Record that superseded this one on rotation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaced_by_token_id: Option<String>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Revoked because it was rotated away, as opposed to logged out.
    pub fn was_replaced(&self) -> bool {
        self.replaced_by_token_id.is_some()
    }
}

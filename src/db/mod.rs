//! Persistence contracts for users and refresh tokens.
//!
//! The services only talk to these traits. `MemoryStore` is the in-process
//! implementation used by the server and the tests.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{NewUser, RefreshTokenRecord, User, UserPatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// User persistence.
///
/// Email, phone number and Google id are unique when present; inserts and
/// patches that would break that fail with `AppError::Conflict`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_user_by_phone_number(&self, phone_number: &str) -> Result<Option<User>>;

    async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<User>>;

    /// Apply `patch` atomically. Returns `None` if the user does not exist.
    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>>;
}

/// Refresh token persistence. All lookups are by fingerprint or id.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save_refresh_token(&self, record: RefreshTokenRecord) -> Result<()>;

    async fn find_refresh_token_by_hash(&self, token_hash: &str)
        -> Result<Option<RefreshTokenRecord>>;

    async fn find_refresh_token_by_id(&self, id: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Set `revoked_at` unless it is already set.
    async fn revoke_refresh_token(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Mark `old_id` revoked and replaced by `new_id` in one step.
    ///
    /// Only succeeds while `old_id` is still unrevoked. Returns `false` if it
    /// is missing or another caller already revoked it.
    async fn replace_refresh_token(
        &self,
        old_id: &str,
        new_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

//! In-memory store.
//!
//! Users live in one table behind a write lock so the uniqueness indexes
//! move together with the rows. Refresh tokens sit in `DashMap`s; a
//! rotation only ever touches a single entry, which DashMap locks for us.

use crate::db::{RefreshTokenStore, UserStore};
use crate::error::{AppError, Result};
use crate::models::{NewUser, RefreshTokenRecord, User, UserPatch};
use crate::time_utils::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct UserTable {
    by_id: HashMap<String, User>,
    id_by_email: HashMap<String, String>,
    id_by_phone: HashMap<String, String>,
    id_by_google_id: HashMap<String, String>,
}

impl UserTable {
    fn lookup(&self, index: &HashMap<String, String>, key: &str) -> Option<User> {
        index.get(key).and_then(|id| self.by_id.get(id)).cloned()
    }

    /// Fails if `key` is indexed to a user other than `owner`.
    fn ensure_unclaimed(
        index: &HashMap<String, String>,
        key: Option<&str>,
        owner: Option<&str>,
        what: &str,
    ) -> Result<()> {
        let Some(key) = key else {
            return Ok(());
        };

        match index.get(key) {
            Some(id) if Some(id.as_str()) != owner => Err(AppError::Conflict(format!(
                "A user with this {what} already exists."
            ))),
            _ => Ok(()),
        }
    }
}

/// Process-local user and refresh token store.
#[derive(Clone)]
pub struct MemoryStore {
    users: Arc<RwLock<UserTable>>,
    tokens_by_id: Arc<DashMap<String, RefreshTokenRecord>>,
    token_ids_by_hash: Arc<DashMap<String, String>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            users: Arc::new(RwLock::new(UserTable::default())),
            tokens_by_id: Arc::new(DashMap::new()),
            token_ids_by_hash: Arc::new(DashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let mut table = self.users.write().await;

        if table.by_id.contains_key(&new_user.id) {
            return Err(AppError::Database(format!(
                "duplicate user id {}",
                new_user.id
            )));
        }

        UserTable::ensure_unclaimed(&table.id_by_email, new_user.email.as_deref(), None, "email")?;
        UserTable::ensure_unclaimed(
            &table.id_by_phone,
            new_user.phone_number.as_deref(),
            None,
            "phone number",
        )?;
        UserTable::ensure_unclaimed(
            &table.id_by_google_id,
            new_user.google_id.as_deref(),
            None,
            "Google account",
        )?;

        let now = self.clock.now();
        let user = User {
            id: new_user.id,
            email: new_user.email,
            phone_number: new_user.phone_number,
            google_id: new_user.google_id,
            auth_provider: new_user.auth_provider,
            is_active: new_user.is_active,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        if let Some(email) = &user.email {
            table.id_by_email.insert(email.clone(), user.id.clone());
        }
        if let Some(phone) = &user.phone_number {
            table.id_by_phone.insert(phone.clone(), user.id.clone());
        }
        if let Some(google_id) = &user.google_id {
            table.id_by_google_id.insert(google_id.clone(), user.id.clone());
        }
        table.by_id.insert(user.id.clone(), user.clone());

        Ok(user)
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.by_id.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let table = self.users.read().await;
        Ok(table.lookup(&table.id_by_email, email))
    }

    async fn get_user_by_phone_number(&self, phone_number: &str) -> Result<Option<User>> {
        let table = self.users.read().await;
        Ok(table.lookup(&table.id_by_phone, phone_number))
    }

    async fn get_user_by_google_id(&self, google_id: &str) -> Result<Option<User>> {
        let table = self.users.read().await;
        Ok(table.lookup(&table.id_by_google_id, google_id))
    }

    async fn update_user(&self, id: &str, patch: UserPatch) -> Result<Option<User>> {
        let mut table = self.users.write().await;

        let Some(current) = table.by_id.get(id).cloned() else {
            return Ok(None);
        };

        UserTable::ensure_unclaimed(&table.id_by_email, patch.email.as_deref(), Some(id), "email")?;
        UserTable::ensure_unclaimed(
            &table.id_by_google_id,
            patch.google_id.as_deref(),
            Some(id),
            "Google account",
        )?;

        let mut updated = current.clone();
        patch.apply(&mut updated, self.clock.now());

        if updated.email != current.email {
            if let Some(old) = &current.email {
                table.id_by_email.remove(old);
            }
            if let Some(new) = &updated.email {
                table.id_by_email.insert(new.clone(), id.to_string());
            }
        }
        if updated.google_id != current.google_id {
            if let Some(old) = &current.google_id {
                table.id_by_google_id.remove(old);
            }
            if let Some(new) = &updated.google_id {
                table.id_by_google_id.insert(new.clone(), id.to_string());
            }
        }

        table.by_id.insert(id.to_string(), updated.clone());
        Ok(Some(updated))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn save_refresh_token(&self, record: RefreshTokenRecord) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.token_ids_by_hash.entry(record.token_hash.clone()) {
            Entry::Occupied(_) => {
                return Err(AppError::Database(
                    "refresh token fingerprint already stored".to_string(),
                ));
            }
            Entry::Vacant(slot) => {
                slot.insert(record.id.clone());
            }
        }

        self.tokens_by_id.insert(record.id.clone(), record);
        Ok(())
    }

    async fn find_refresh_token_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>> {
        let Some(id) = self
            .token_ids_by_hash
            .get(token_hash)
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };

        Ok(self.tokens_by_id.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_refresh_token_by_id(&self, id: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.tokens_by_id.get(id).map(|entry| entry.value().clone()))
    }

    async fn revoke_refresh_token(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut record) = self.tokens_by_id.get_mut(id) {
            if record.revoked_at.is_none() {
                record.revoked_at = Some(at);
            }
        }
        Ok(())
    }

    async fn replace_refresh_token(
        &self,
        old_id: &str,
        new_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut record) = self.tokens_by_id.get_mut(old_id) else {
            return Ok(false);
        };

        if record.revoked_at.is_some() {
            return Ok(false);
        }

        record.revoked_at = Some(at);
        record.replaced_by_token_id = Some(new_id.to_string());
        Ok(true)
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session issuance and refresh token rotation.
//!
//! Every refresh token is single use. Presenting it mints a new pair and
//! retires the old record, linking it to its successor. A retired token that
//! shows up again is treated as stolen.

use crate::config::Config;
use crate::db::{RefreshTokenStore, UserStore};
use crate::error::{AppError, Result};
use crate::models::{RefreshTokenRecord, TokenPair, User, UserPatch};
use crate::services::token_codec::TokenCodec;
use crate::time_utils::{format_utc_rfc3339, Clock};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Upper bound on how far a reuse walks the rotation chain.
const MAX_CHAIN_HOPS: usize = 10_000;

const MSG_INVALID: &str = "Refresh token is invalid.";
const MSG_REVOKED: &str = "Refresh token has been revoked.";
const MSG_EXPIRED: &str = "Refresh token has expired.";

/// Issues, rotates and revokes token pairs.
#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn RefreshTokenStore>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    access_token_ttl: String,
    revoke_chain_on_reuse: bool,
}

impl SessionService {
    pub fn new(
        config: &Config,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            tokens,
            codec,
            clock,
            access_token_ttl: config.access_token_ttl.clone(),
            revoke_chain_on_reuse: config.revoke_chain_on_reuse,
        }
    }

    /// Start a new session for `user`.
    pub async fn issue_tokens(&self, user: &User) -> Result<TokenPair> {
        if !user.is_active {
            return Err(AppError::Forbidden("User is inactive.".to_string()));
        }

        let now = self.clock.now();
        let access_token = self.codec.sign_access_token(&user.id, user.auth_provider)?;
        let (refresh_token, record) = self.codec.new_refresh_token(&user.id, now)?;
        let token_id = record.id.clone();
        let expires_at = record.expires_at;

        self.tokens.save_refresh_token(record).await?;

        if self
            .users
            .update_user(&user.id, UserPatch::last_login(now))
            .await?
            .is_none()
        {
            self.tokens.revoke_refresh_token(&token_id, now).await?;
            return Err(AppError::NotFound("User not found.".to_string()));
        }

        tracing::info!(
            user_id = %user.id,
            token_id = %token_id,
            refresh_expires_at = %format_utc_rfc3339(expires_at),
            "Issued token pair"
        );

        Ok(self.pair(access_token, refresh_token))
    }

    /// Spend `refresh_token` for a new pair.
    pub async fn rotate_refresh_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let token_hash = self.codec.fingerprint(refresh_token)?;
        let existing = self
            .tokens
            .find_refresh_token_by_hash(&token_hash)
            .await?
            .ok_or_else(|| AppError::Unauthorized(MSG_INVALID.to_string()))?;

        let now = self.clock.now();

        if existing.is_revoked() {
            if existing.was_replaced() {
                tracing::warn!(
                    token_id = %existing.id,
                    user_id = %existing.user_id,
                    "Rotated refresh token presented again"
                );
                if self.revoke_chain_on_reuse {
                    self.revoke_descendants(&existing, now).await?;
                }
            }
            return Err(AppError::Unauthorized(MSG_REVOKED.to_string()));
        }

        if existing.is_expired(now) {
            return Err(AppError::Unauthorized(MSG_EXPIRED.to_string()));
        }

        let user = self
            .users
            .get_user_by_id(&existing.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found.".to_string()))?;

        if !user.is_active {
            return Err(AppError::Forbidden("User is inactive.".to_string()));
        }

        let access_token = self.codec.sign_access_token(&user.id, user.auth_provider)?;
        let (new_refresh_token, record) = self.codec.new_refresh_token(&user.id, now)?;
        let new_id = record.id.clone();

        self.tokens.save_refresh_token(record).await?;

        if !self
            .tokens
            .replace_refresh_token(&existing.id, &new_id, now)
            .await?
        {
            // A concurrent rotation spent the same secret first.
            self.tokens.revoke_refresh_token(&new_id, now).await?;
            tracing::warn!(
                token_id = %existing.id,
                user_id = %user.id,
                "Lost refresh token rotation race"
            );
            return Err(AppError::Unauthorized(MSG_REVOKED.to_string()));
        }

        tracing::debug!(
            user_id = %user.id,
            old_token_id = %existing.id,
            new_token_id = %new_id,
            "Rotated refresh token"
        );

        Ok(self.pair(access_token, new_refresh_token))
    }

    /// Log out. Unknown and already revoked tokens are silently ignored.
    pub async fn revoke_refresh_token(&self, refresh_token: &str) {
        if let Err(e) = self.try_revoke(refresh_token).await {
            tracing::error!(error = %e, "Failed to revoke refresh token");
        }
    }

    async fn try_revoke(&self, refresh_token: &str) -> Result<()> {
        let token_hash = self.codec.fingerprint(refresh_token)?;

        let Some(existing) = self.tokens.find_refresh_token_by_hash(&token_hash).await? else {
            return Ok(());
        };

        if existing.is_revoked() {
            return Ok(());
        }

        self.tokens
            .revoke_refresh_token(&existing.id, self.clock.now())
            .await?;

        tracing::info!(
            user_id = %existing.user_id,
            token_id = %existing.id,
            "Revoked refresh token"
        );
        Ok(())
    }

    /// Revoke every still-live successor of `start`.
    async fn revoke_descendants(&self, start: &RefreshTokenRecord, now: DateTime<Utc>) -> Result<()> {
        let mut next = start.replaced_by_token_id.clone();
        let mut revoked = 0usize;

        for _ in 0..MAX_CHAIN_HOPS {
            let Some(id) = next else {
                break;
            };
            let Some(record) = self.tokens.find_refresh_token_by_id(&id).await? else {
                break;
            };

            if !record.is_revoked() {
                self.tokens.revoke_refresh_token(&record.id, now).await?;
                revoked += 1;
            }
            next = record.replaced_by_token_id;
        }

        if revoked > 0 {
            tracing::warn!(
                user_id = %start.user_id,
                revoked,
                "Revoked refresh token chain after reuse"
            );
        }
        Ok(())
    }

    fn pair(&self, access_token: String, refresh_token: String) -> TokenPair {
        TokenPair::bearer(access_token, refresh_token, &self.access_token_ttl)
    }
}

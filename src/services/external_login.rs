// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Login with a Google ID token.
//!
//! The ID token is exchanged exactly once for our own token pair. From then
//! on the session follows the normal refresh rotation.

use crate::db::UserStore;
use crate::error::{AppError, Result};
use crate::models::{AuthProvider, TokenPair, User, UserPatch};
use crate::services::google_identity::{ExternalProfile, IdentityAssertionVerifier};
use crate::services::identity::{CreateUserInput, IdentityService};
use crate::services::replay::ReplayCache;
use crate::services::session::SessionService;
use crate::services::token_codec::TokenCodec;
use crate::time_utils::Clock;
use std::sync::Arc;
use std::time::Duration;

const MSG_INVALID_ASSERTION: &str = "Google token is invalid.";

/// Exchanges verified Google identities for sessions.
#[derive(Clone)]
pub struct ExternalLoginService {
    verifier: Arc<dyn IdentityAssertionVerifier>,
    replay_cache: Arc<dyn ReplayCache>,
    users: Arc<dyn UserStore>,
    identity: IdentityService,
    sessions: SessionService,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    verify_timeout: Duration,
}

/// Collaborators for [`ExternalLoginService`].
pub struct ExternalLoginDeps {
    pub verifier: Arc<dyn IdentityAssertionVerifier>,
    pub replay_cache: Arc<dyn ReplayCache>,
    pub users: Arc<dyn UserStore>,
    pub identity: IdentityService,
    pub sessions: SessionService,
    pub codec: TokenCodec,
    pub clock: Arc<dyn Clock>,
}

impl ExternalLoginService {
    pub fn new(deps: ExternalLoginDeps, verify_timeout: Duration) -> Self {
        Self {
            verifier: deps.verifier,
            replay_cache: deps.replay_cache,
            users: deps.users,
            identity: deps.identity,
            sessions: deps.sessions,
            codec: deps.codec,
            clock: deps.clock,
            verify_timeout,
        }
    }

    /// Verify `assertion`, resolve the user it names, and start a session.
    pub async fn login_with_external_assertion(&self, assertion: &str) -> Result<TokenPair> {
        let assertion = assertion.trim();
        if assertion.is_empty() {
            return Err(AppError::Validation("Google ID token is required.".to_string()));
        }

        let profile = self.verify(assertion).await?;

        if !profile.email_verified {
            return Err(AppError::Forbidden("Google email is not verified.".to_string()));
        }

        let key = self.codec.fingerprint(assertion)?;
        if !self
            .replay_cache
            .check_and_insert(&key, profile.expires_at, self.clock.now())
        {
            tracing::warn!(google_id = %profile.google_id, "Google ID token replayed");
            return Err(AppError::Conflict(
                "Google token has already been used.".to_string(),
            ));
        }

        let user = self.link_profile(&profile).await?;
        self.sessions.issue_tokens(&user).await
    }

    async fn verify(&self, assertion: &str) -> Result<ExternalProfile> {
        match tokio::time::timeout(self.verify_timeout, self.verifier.verify(assertion)).await {
            Ok(Ok(profile)) => Ok(profile),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Google ID token verification failed");
                Err(AppError::Unauthorized(MSG_INVALID_ASSERTION.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.verify_timeout.as_millis() as u64,
                    "Google ID token verification timed out"
                );
                Err(AppError::Unauthorized(MSG_INVALID_ASSERTION.to_string()))
            }
        }
    }

    /// Find or create the user for a verified Google profile.
    ///
    /// An existing Google link wins and follows email changes. An email owned
    /// by a non-Google account is never taken over.
    async fn link_profile(&self, profile: &ExternalProfile) -> Result<User> {
        if let Some(user) = self.users.get_user_by_google_id(&profile.google_id).await? {
            if user.email.as_deref() == Some(profile.email.as_str()) {
                return Ok(user);
            }

            if let Some(owner) = self.users.get_user_by_email(&profile.email).await? {
                if owner.id != user.id {
                    return Err(AppError::Conflict(
                        "This email is already linked to another account.".to_string(),
                    ));
                }
            }

            tracing::info!(user_id = %user.id, "Syncing email from Google profile");
            return self
                .patch_user(
                    &user.id,
                    UserPatch {
                        email: Some(profile.email.clone()),
                        ..Default::default()
                    },
                )
                .await;
        }

        if let Some(user) = self.users.get_user_by_email(&profile.email).await? {
            if user.auth_provider != AuthProvider::Google {
                return Err(AppError::Conflict(
                    "This email is registered with a different sign-in method.".to_string(),
                ));
            }
            if user.google_id.is_some() {
                return Err(AppError::Conflict(
                    "This email is already linked to another Google account.".to_string(),
                ));
            }

            tracing::info!(user_id = %user.id, "Linking Google account to existing user");
            return self
                .patch_user(
                    &user.id,
                    UserPatch {
                        google_id: Some(profile.google_id.clone()),
                        ..Default::default()
                    },
                )
                .await;
        }

        self.identity
            .create_user(CreateUserInput::google(
                profile.email.clone(),
                profile.google_id.clone(),
            ))
            .await
    }

    async fn patch_user(&self, id: &str, patch: UserPatch) -> Result<User> {
        self.users
            .update_user(id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found.".to_string()))
    }
}

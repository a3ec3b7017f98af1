// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Rapid-Auth: session and credential lifecycle for the mobile backend
//!
//! This crate issues short-lived access tokens and single-use rotating
//! refresh tokens, resolves SMS and Google identities to users, and
//! exchanges verified Google ID tokens for sessions.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{RefreshTokenStore, UserStore};
use services::{
    ExternalLoginDeps, ExternalLoginService, IdentityAssertionVerifier, IdentityService,
    ReplayCache, SessionService, TokenCodec,
};
use std::sync::Arc;
use time_utils::Clock;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub codec: TokenCodec,
    pub identity: IdentityService,
    pub sessions: SessionService,
    pub external_login: ExternalLoginService,
}

impl AppState {
    /// Wire the services on top of the given collaborators.
    pub fn new(
        config: Config,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn RefreshTokenStore>,
        verifier: Arc<dyn IdentityAssertionVerifier>,
        replay_cache: Arc<dyn ReplayCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codec = TokenCodec::new(&config, clock.clone());
        let identity = IdentityService::new(users.clone());
        let sessions = SessionService::new(
            &config,
            users.clone(),
            tokens,
            codec.clone(),
            clock.clone(),
        );
        let external_login = ExternalLoginService::new(
            ExternalLoginDeps {
                verifier,
                replay_cache,
                users: users.clone(),
                identity: identity.clone(),
                sessions: sessions.clone(),
                codec: codec.clone(),
                clock,
            },
            config.google_verify_timeout(),
        );

        Self {
            config,
            users,
            codec,
            identity,
            sessions,
            external_login,
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rapid-Auth API Server
//!
//! Issues and rotates session tokens for the mobile app and accepts
//! Google Sign-In as an alternate login path.

use rapid_auth::{
    config::Config,
    db::MemoryStore,
    services::{GoogleIdTokenVerifier, InMemoryReplayCache},
    time_utils::{Clock, SystemClock},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        access_token_ttl = %config.access_token_ttl,
        refresh_token_ttl = %config.refresh_token_ttl,
        revoke_chain_on_reuse = config.revoke_chain_on_reuse,
        "Starting Rapid-Auth API"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Process-local store; swap for a shared implementation before scaling out.
    let store = MemoryStore::new(clock.clone());
    let verifier = GoogleIdTokenVerifier::new(&config)?;

    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::new(store.clone()),
        Arc::new(store),
        Arc::new(verifier),
        Arc::new(InMemoryReplayCache::new()),
        clock,
    ));

    // Build router
    let app = rapid_auth::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rapid_auth=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}

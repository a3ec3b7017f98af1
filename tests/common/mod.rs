// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use rapid_auth::config::Config;
use rapid_auth::db::MemoryStore;
use rapid_auth::routes::create_router;
use rapid_auth::services::{
    ExternalProfile, IdentityAssertionVerifier, InMemoryReplayCache, VerificationError,
};
use rapid_auth::time_utils::{Clock, ManualClock};
use rapid_auth::AppState;
use std::sync::Arc;

/// Verifier that accepts a fixed set of assertion strings.
#[derive(Default)]
pub struct FakeVerifier {
    profiles: DashMap<String, ExternalProfile>,
    delay: Option<std::time::Duration>,
}

#[allow(dead_code)]
impl FakeVerifier {
    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            profiles: DashMap::new(),
            delay: Some(delay),
        }
    }

    pub fn register(&self, assertion: &str, profile: ExternalProfile) {
        self.profiles.insert(assertion.to_string(), profile);
    }
}

#[async_trait]
impl IdentityAssertionVerifier for FakeVerifier {
    async fn verify(&self, assertion: &str) -> Result<ExternalProfile, VerificationError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.profiles
            .get(assertion)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                VerificationError::Rejected("signature mismatch for kid test-key".to_string())
            })
    }
}

/// Google profile that expires an hour from now.
#[allow(dead_code)]
pub fn google_profile(email: &str, google_id: &str, email_verified: bool) -> ExternalProfile {
    ExternalProfile {
        email: email.to_string(),
        google_id: google_id.to_string(),
        email_verified,
        expires_at: Utc::now() + Duration::hours(1),
    }
}

/// Fully wired in-memory application.
#[allow(dead_code)]
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub verifier: Arc<FakeVerifier>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }
}

#[allow(dead_code)]
pub fn test_app() -> TestApp {
    test_app_with(Config::test_default(), FakeVerifier::default())
}

#[allow(dead_code)]
pub fn test_app_with(config: Config, verifier: FakeVerifier) -> TestApp {
    let clock = ManualClock::new(Utc::now());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let store = MemoryStore::new(shared_clock.clone());
    let verifier = Arc::new(verifier);

    let state = Arc::new(AppState::new(
        config,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        verifier.clone(),
        Arc::new(InMemoryReplayCache::new()),
        shared_clock,
    ));

    TestApp {
        state,
        store,
        clock,
        verifier,
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single-use guard for external identity assertions.
//!
//! `InMemoryReplayCache` only protects a single process. Running more than
//! one instance needs an implementation backed by shared storage.

use crate::services::google_identity::CLOCK_SKEW_SECS;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Remembers consumed keys until their expiry.
///
/// Verifiers accept assertions for a short skew window past `exp`, so a key
/// must outlive `expires_at` by at least that window.
pub trait ReplayCache: Send + Sync {
    /// Record `key` as consumed until `expires_at` plus the skew window.
    ///
    /// Returns `false` if the key was already consumed and is still retained.
    fn check_and_insert(&self, key: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool;
}

/// Process-local replay cache with lazy expiry.
pub struct InMemoryReplayCache {
    entries: DashMap<String, DateTime<Utc>>,
    grace: Duration,
}

impl Default for InMemoryReplayCache {
    fn default() -> Self {
        Self::with_grace(Duration::seconds(CLOCK_SKEW_SECS as i64))
    }
}

impl InMemoryReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep each key for `grace` past its `expires_at`.
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            grace,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, retain_until| *retain_until > now);
    }
}

impl ReplayCache for InMemoryReplayCache {
    fn check_and_insert(&self, key: &str, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.prune(now);

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                // Out-of-range expiries are kept until the far end of time.
                let retain_until = expires_at
                    .checked_add_signed(self.grace)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                slot.insert(retain_until);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn second_use_is_rejected() {
        let cache = InMemoryReplayCache::new();
        let now = Utc::now();
        let exp = now + Duration::minutes(5);

        assert!(cache.check_and_insert("a", exp, now));
        assert!(!cache.check_and_insert("a", exp, now + Duration::minutes(1)));
        assert!(cache.check_and_insert("b", exp, now));
    }

    #[test]
    fn expired_entries_are_pruned() {
        let cache = InMemoryReplayCache::with_grace(Duration::zero());
        let now = Utc::now();

        assert!(cache.check_and_insert("a", now + Duration::minutes(5), now));
        assert!(cache.check_and_insert("b", now + Duration::hours(1), now));

        let later = now + Duration::minutes(10);
        assert!(cache.check_and_insert("c", later + Duration::minutes(5), later));
        assert_eq!(cache.len(), 2);

        assert!(cache.check_and_insert("a", later + Duration::minutes(5), later));
    }

    #[test]
    fn key_is_retained_through_skew_window() {
        let cache = InMemoryReplayCache::new();
        let now = Utc::now();
        let exp = now - Duration::seconds(10);

        assert!(cache.check_and_insert("late", exp, now));
        assert!(!cache.check_and_insert("late", exp, now));
        assert!(!cache.check_and_insert("late", exp, now + Duration::seconds(45)));

        // Past exp + skew the verifier rejects the assertion itself.
        let after = exp + Duration::seconds(CLOCK_SKEW_SECS as i64) + Duration::seconds(1);
        assert!(cache.check_and_insert("late", exp, after));
    }

    #[test]
    fn out_of_range_expiry_does_not_panic() {
        let cache = InMemoryReplayCache::new();
        let now = Utc::now();

        assert!(cache.check_and_insert("far", DateTime::<Utc>::MAX_UTC, now));
        assert!(!cache.check_and_insert("far", DateTime::<Utc>::MAX_UTC, now));
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google Sign-In ID token verification.

use crate::config::Config;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

const DISCOVERY_URL: &str = "https://accounts.google.com/.well-known/openid-configuration";
const DEFAULT_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
/// Leeway applied to `exp` and `iat` of Google ID tokens.
pub const CLOCK_SKEW_SECS: u64 = 60;

/// Profile extracted from a verified identity assertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalProfile {
    pub email: String,
    /// Google account subject (`sub` claim)
    pub google_id: String,
    pub email_verified: bool,
    /// When the assertion itself stops being valid
    pub expires_at: DateTime<Utc>,
}

/// Assertion verification error categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VerificationError {
    /// The assertion is malformed, forged, expired or meant for someone else.
    #[error("assertion rejected: {0}")]
    Rejected(String),
    /// Key material could not be fetched.
    #[error("verification unavailable: {0}")]
    Transient(String),
}

/// Verifies a third-party identity assertion.
#[async_trait]
pub trait IdentityAssertionVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<ExternalProfile, VerificationError>;
}

#[derive(Clone)]
struct DiscoveryCacheEntry {
    jwks_uri: String,
    expires_at: Instant,
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for Google-issued ID tokens, with discovery and JWKS caching.
pub struct GoogleIdTokenVerifier {
    http_client: reqwest::Client,
    client_id: String,
    discovery_cache: RwLock<Option<DiscoveryCacheEntry>>,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl GoogleIdTokenVerifier {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building Google JWKS HTTP client")?;

        if config.google_client_id.is_empty() {
            tracing::warn!("GOOGLE_CLIENT_ID is not set; every Google ID token will be rejected");
        } else {
            tracing::info!(
                client_id = %config.google_client_id,
                "Initialized Google ID token verifier"
            );
        }

        Ok(Self {
            http_client,
            client_id: config.google_client_id.clone(),
            discovery_cache: RwLock::new(None),
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, VerificationError> {
        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(VerificationError::Rejected(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), VerificationError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        let jwks_uri = self.resolve_jwks_uri(force_refresh).await?;

        tracing::debug!(jwks_uri = %jwks_uri, "Refreshing Google JWKS cache");

        let response = self
            .http_client
            .get(&jwks_uri)
            .send()
            .await
            .map_err(|e| VerificationError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(VerificationError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| VerificationError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_rsa_keys(jwks);

        if keys_by_kid.is_empty() {
            return Err(VerificationError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "Google JWKS cache refreshed");
        Ok(())
    }

    async fn resolve_jwks_uri(&self, force_refresh: bool) -> Result<String, VerificationError> {
        if !force_refresh {
            let cache = self.discovery_cache.read().await;
            if let Some(entry) = cache
                .as_ref()
                .filter(|entry| entry.expires_at > Instant::now())
            {
                return Ok(entry.jwks_uri.clone());
            }
        }

        let cached_jwks_uri = self
            .discovery_cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.jwks_uri.clone());

        match self.http_client.get(DISCOVERY_URL).send().await {
            Ok(resp) if resp.status().is_success() => {
                let ttl = cache_ttl_from_headers(resp.headers(), DEFAULT_CACHE_TTL);
                let discovery: OpenIdConfig = resp.json().await.map_err(|e| {
                    VerificationError::Transient(format!("invalid discovery JSON: {e}"))
                })?;

                *self.discovery_cache.write().await = Some(DiscoveryCacheEntry {
                    jwks_uri: discovery.jwks_uri.clone(),
                    expires_at: Instant::now() + ttl,
                });

                Ok(discovery.jwks_uri)
            }
            Ok(resp) => {
                tracing::warn!(
                    status = %resp.status(),
                    "OIDC discovery returned non-success status; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "OIDC discovery request failed; using fallback JWKS URI"
                );
                Ok(cached_jwks_uri.unwrap_or_else(|| DEFAULT_JWKS_URL.to_string()))
            }
        }
    }
}

#[async_trait]
impl IdentityAssertionVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<ExternalProfile, VerificationError> {
        if self.client_id.is_empty() {
            return Err(VerificationError::Rejected(
                "no Google client id configured".to_string(),
            ));
        }

        let header = decode_header(id_token)
            .map_err(|e| VerificationError::Rejected(format!("invalid JWT header: {e}")))?;

        if header.alg != Algorithm::RS256 {
            return Err(VerificationError::Rejected(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| VerificationError::Rejected("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&GOOGLE_ISSUERS);
        validation.set_audience(&[self.client_id.as_str()]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<GoogleIdTokenClaims>(id_token, decoding_key.as_ref(), &validation)
            .map_err(|e| VerificationError::Rejected(format!("JWT validation failed: {e}")))?
            .claims;

        validate_iat(claims.iat)?;
        profile_from_claims(claims)
    }
}

#[derive(Debug, Deserialize)]
struct OpenIdConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    alg: Option<String>,
    n: String,
    e: String,
    #[serde(rename = "use")]
    use_: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    exp: i64,
    iat: Option<u64>,
    email: Option<String>,
    /// Google has sent this both as a JSON bool and as the string "true".
    #[serde(default, deserialize_with = "bool_or_string")]
    email_verified: Option<bool>,
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => Some(b),
        Some(Flag::Text(s)) => Some(s.eq_ignore_ascii_case("true")),
        None => None,
    })
}

fn usable_rsa_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }

        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }

        if jwk.use_.as_deref().is_some_and(|use_| use_ != "sig") {
            continue;
        }

        match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

fn profile_from_claims(claims: GoogleIdTokenClaims) -> Result<ExternalProfile, VerificationError> {
    let email = claims
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| VerificationError::Rejected("missing email claim".to_string()))?;

    if claims.sub.trim().is_empty() {
        return Err(VerificationError::Rejected("empty sub claim".to_string()));
    }

    let expires_at = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .ok_or_else(|| VerificationError::Rejected("exp claim out of range".to_string()))?;

    Ok(ExternalProfile {
        email,
        google_id: claims.sub,
        email_verified: claims.email_verified.unwrap_or(false),
        expires_at,
    })
}

fn validate_iat(iat: Option<u64>) -> Result<(), VerificationError> {
    let Some(iat) = iat else {
        return Err(VerificationError::Rejected("missing iat claim".to_string()));
    };

    if iat > now_unix_secs() + CLOCK_SKEW_SECS {
        return Err(VerificationError::Rejected(
            "iat claim is in the future".to_string(),
        ));
    }

    Ok(())
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|raw| raw.trim_matches('"').parse::<u64>().ok())
    })
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cache_control_max_age_valid() {
        assert_eq!(
            parse_cache_control_max_age("public, max-age=3600"),
            Some(3600)
        );
        assert_eq!(parse_cache_control_max_age("max-age=60"), Some(60));
        assert_eq!(parse_cache_control_max_age("max-age=\"120\""), Some(120));
    }

    #[test]
    fn parse_cache_control_max_age_invalid() {
        assert_eq!(parse_cache_control_max_age("public, immutable"), None);
        assert_eq!(parse_cache_control_max_age("max-age=abc"), None);
        assert_eq!(parse_cache_control_max_age(""), None);
    }

    #[test]
    fn email_verified_accepts_bool_and_string() {
        let claims: GoogleIdTokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "g1", "exp": 1_900_000_000, "iat": 1, "email": "a@x.com",
            "email_verified": "true"
        }))
        .unwrap();
        assert_eq!(claims.email_verified, Some(true));

        let claims: GoogleIdTokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "g1", "exp": 1_900_000_000, "email": "a@x.com", "email_verified": false
        }))
        .unwrap();
        assert_eq!(claims.email_verified, Some(false));

        let claims: GoogleIdTokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "g1", "exp": 1_900_000_000, "email": "a@x.com"
        }))
        .unwrap();
        assert_eq!(claims.email_verified, None);
    }

    #[test]
    fn profile_requires_email() {
        let claims: GoogleIdTokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "g1", "exp": 1_900_000_000, "email_verified": true
        }))
        .unwrap();
        assert!(matches!(
            profile_from_claims(claims),
            Err(VerificationError::Rejected(_))
        ));
    }

    #[test]
    fn profile_maps_claims() {
        let claims: GoogleIdTokenClaims = serde_json::from_value(serde_json::json!({
            "sub": "g1", "exp": 1_900_000_000, "email": "a@x.com"
        }))
        .unwrap();
        let profile = profile_from_claims(claims).unwrap();

        assert_eq!(profile.google_id, "g1");
        assert_eq!(profile.email, "a@x.com");
        assert!(!profile.email_verified);
        assert_eq!(profile.expires_at.timestamp(), 1_900_000_000);
    }

    #[test]
    fn iat_in_future_is_rejected() {
        assert!(validate_iat(Some(now_unix_secs())).is_ok());
        assert!(validate_iat(Some(now_unix_secs() + 3600)).is_err());
        assert!(validate_iat(None).is_err());
    }

    #[test]
    fn jwks_filtering_skips_unusable_keys() {
        let jwks: Jwks = serde_json::from_value(serde_json::json!({
            "keys": [
                { "kid": "ec", "kty": "EC", "n": "AQAB", "e": "AQAB" },
                { "kid": "enc", "kty": "RSA", "use": "enc", "n": "AQAB", "e": "AQAB" },
                { "kid": "ps", "kty": "RSA", "alg": "PS256", "n": "AQAB", "e": "AQAB" },
                { "kid": " ", "kty": "RSA", "n": "AQAB", "e": "AQAB" },
                { "kid": "good", "kty": "RSA", "alg": "RS256", "use": "sig", "n": "AQAB", "e": "AQAB" }
            ]
        }))
        .unwrap();

        let keys = usable_rsa_keys(jwks);
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("good"));
    }
}

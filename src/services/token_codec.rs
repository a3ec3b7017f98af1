// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token signing and refresh token fingerprinting.
//!
//! Access tokens are HS256 JWTs bound to a fixed issuer/audience pair.
//! Refresh tokens are opaque random strings; only their HMAC-SHA256
//! fingerprint is ever stored.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{AuthProvider, RefreshTokenRecord};
use crate::time_utils::Clock;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

// Type alias for HMAC-SHA256
type HmacSha256 = Hmac<Sha256>;

pub const ACCESS_TOKEN_ISSUER: &str = "backend";
pub const ACCESS_TOKEN_AUDIENCE: &str = "mobile";
const ACCESS_TOKEN_TYPE: &str = "access";

/// 512 bits of entropy per refresh secret.
const REFRESH_SECRET_BYTES: usize = 64;

/// Claims carried by every access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccessTokenClaims {
    /// Subject (user id)
    pub sub: String,
    pub provider: AuthProvider,
    /// Always "access"
    #[serde(rename = "type")]
    pub token_type: String,
    pub iss: String,
    pub aud: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Signs and verifies access tokens; mints and fingerprints refresh secrets.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    fingerprint_key: Arc<[u8]>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    rng: SystemRandom,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(&config.jwt_access_secret),
            decoding_key: DecodingKey::from_secret(&config.jwt_access_secret),
            fingerprint_key: Arc::from(config.jwt_refresh_secret.as_slice()),
            access_ttl: config.access_ttl(),
            refresh_ttl: config.refresh_ttl(),
            rng: SystemRandom::new(),
            clock,
        }
    }

    /// Sign a short-lived access token for `user_id`.
    pub fn sign_access_token(&self, user_id: &str, provider: AuthProvider) -> Result<String> {
        let now = self.clock.now().timestamp();
        let exp = now
            .checked_add(self.access_ttl.num_seconds())
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Access token expiry overflowed")))?;

        let claims = AccessTokenClaims {
            sub: user_id.to_string(),
            provider,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            iss: ACCESS_TOKEN_ISSUER.to_string(),
            aud: ACCESS_TOKEN_AUDIENCE.to_string(),
            iat: now,
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT signing failed: {}", e)))
    }

    /// Verify signature, issuer, audience, expiry and token type.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(&[ACCESS_TOKEN_ISSUER]);
        validation.set_audience(&[ACCESS_TOKEN_AUDIENCE]);
        // Expiry is checked against the injected clock below.
        validation.validate_exp = false;

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Access token rejected");
                AppError::InvalidToken
            })?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(AppError::InvalidToken);
        }

        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AppError::InvalidToken);
        }

        Ok(claims)
    }

    /// Fresh opaque refresh secret, URL-safe base64 without padding.
    pub fn generate_refresh_secret(&self) -> Result<String> {
        let mut bytes = [0u8; REFRESH_SECRET_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Secure random source failed")))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Hex HMAC-SHA256 of `secret` under the fingerprint key.
    pub fn fingerprint(&self, secret: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.fingerprint_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
        mac.update(secret.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Mint a refresh secret and the record that tracks it.
    pub fn new_refresh_token(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, RefreshTokenRecord)> {
        let expires_at = now.checked_add_signed(self.refresh_ttl).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Refresh token expiry overflowed"))
        })?;
        let secret = self.generate_refresh_secret()?;
        let record = RefreshTokenRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            token_hash: self.fingerprint(&secret)?,
            created_at: now,
            expires_at,
            revoked_at: None,
            replaced_by_token_id: None,
        };
        Ok((secret, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::time_utils::ManualClock;

    fn codec() -> (TokenCodec, ManualClock) {
        let clock = ManualClock::new(Utc::now());
        (
            TokenCodec::new(&Config::test_default(), Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn access_token_roundtrip_carries_claims() {
        let (codec, _) = codec();
        let token = codec.sign_access_token("user-1", AuthProvider::Sms).unwrap();

        let claims = codec.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.provider, AuthProvider::Sms);
        assert_eq!(claims.token_type, "access");
        assert_eq!(claims.iss, ACCESS_TOKEN_ISSUER);
        assert_eq!(claims.aud, ACCESS_TOKEN_AUDIENCE);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn access_token_expires() {
        let (codec, clock) = codec();
        let token = codec.sign_access_token("user-1", AuthProvider::Google).unwrap();

        clock.advance(Duration::minutes(15));
        let err = codec.verify_access_token(&token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn access_token_rejects_other_key_and_audience() {
        let (codec, clock) = codec();
        let other = TokenCodec::new(
            &Config {
                jwt_access_secret: b"some_other_access_key_entirely!!".to_vec(),
                ..Config::test_default()
            },
            Arc::new(clock.clone()),
        );
        let token = other.sign_access_token("user-1", AuthProvider::Sms).unwrap();
        assert!(matches!(
            codec.verify_access_token(&token),
            Err(AppError::InvalidToken)
        ));

        let now = clock.now().timestamp();
        let claims = AccessTokenClaims {
            sub: "user-1".into(),
            provider: AuthProvider::Sms,
            token_type: "access".into(),
            iss: ACCESS_TOKEN_ISSUER.into(),
            aud: "web".into(),
            iat: now,
            exp: now + 600,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&Config::test_default().jwt_access_secret),
        )
        .unwrap();
        assert!(matches!(
            codec.verify_access_token(&token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn refresh_secrets_are_url_safe_and_unique() {
        let (codec, _) = codec();
        let a = codec.generate_refresh_secret().unwrap();
        let b = codec.generate_refresh_secret().unwrap();

        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), REFRESH_SECRET_BYTES);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }

    #[test]
    fn fingerprint_is_deterministic_and_keyed() {
        let (codec, clock) = codec();
        let fp = codec.fingerprint("secret").unwrap();

        assert_eq!(fp, codec.fingerprint("secret").unwrap());
        assert_ne!(fp, codec.fingerprint("secret2").unwrap());
        assert_eq!(fp.len(), 64);

        let other = TokenCodec::new(
            &Config {
                jwt_refresh_secret: b"different_refresh_fingerprint_k".to_vec(),
                ..Config::test_default()
            },
            Arc::new(clock),
        );
        assert_ne!(fp, other.fingerprint("secret").unwrap());
    }

    #[test]
    fn expiry_overflow_is_an_error() {
        let (codec, _) = codec();
        let far_future = DateTime::<Utc>::MAX_UTC - Duration::days(1);

        let err = codec.new_refresh_token("user-1", far_future).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn overlong_configured_ttls_fall_back() {
        let clock = ManualClock::new(Utc::now());
        let codec = TokenCodec::new(
            &Config {
                access_token_ttl: "100000000d".to_string(),
                refresh_token_ttl: "100000000d".to_string(),
                ..Config::test_default()
            },
            Arc::new(clock.clone()),
        );

        let token = codec.sign_access_token("user-1", AuthProvider::Sms).unwrap();
        let claims = codec.verify_access_token(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 15 * 60);

        let (_, record) = codec.new_refresh_token("user-1", clock.now()).unwrap();
        assert_eq!(record.expires_at, clock.now() + Duration::days(30));
    }

    #[test]
    fn new_refresh_token_record_matches_secret() {
        let (codec, clock) = codec();
        let now = clock.now();
        let (secret, record) = codec.new_refresh_token("user-1", now).unwrap();

        assert_eq!(record.token_hash, codec.fingerprint(&secret).unwrap());
        assert_ne!(record.token_hash, secret);
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.expires_at, now + Duration::days(30));
        assert!(!record.is_revoked());
    }
}

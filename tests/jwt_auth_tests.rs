// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT wire format tests.
//!
//! These tests decode access tokens with jsonwebtoken directly, so a change
//! to the claim layout that clients depend on is caught here.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rapid_auth::config::Config;
use rapid_auth::error::AppError;
use rapid_auth::models::AuthProvider;
use rapid_auth::services::TokenCodec;
use rapid_auth::time_utils::SystemClock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Claims as a client sees them.
#[derive(Debug, Serialize, Deserialize)]
struct WireClaims {
    sub: String,
    provider: String,
    #[serde(rename = "type")]
    token_type: String,
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

fn codec() -> (TokenCodec, Config) {
    let config = Config::test_default();
    (TokenCodec::new(&config, Arc::new(SystemClock)), config)
}

#[test]
fn test_access_token_wire_claims() {
    let (codec, config) = codec();
    let token = codec
        .sign_access_token("user-123", AuthProvider::Google)
        .unwrap();

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&["backend"]);
    validation.set_audience(&["mobile"]);

    let data = decode::<WireClaims>(
        &token,
        &DecodingKey::from_secret(&config.jwt_access_secret),
        &validation,
    )
    .expect("Failed to decode JWT - check claim compatibility");

    assert_eq!(data.header.alg, Algorithm::HS256);
    assert_eq!(data.claims.sub, "user-123");
    assert_eq!(data.claims.provider, "google");
    assert_eq!(data.claims.token_type, "access");
    assert_eq!(data.claims.exp - data.claims.iat, 900);
}

#[test]
fn test_wrong_token_type_rejected() {
    let (codec, config) = codec();
    let now = chrono::Utc::now().timestamp();

    let claims = WireClaims {
        sub: "user-123".to_string(),
        provider: "sms".to_string(),
        token_type: "refresh".to_string(),
        iss: "backend".to_string(),
        aud: "mobile".to_string(),
        iat: now,
        exp: now + 900,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&config.jwt_access_secret),
    )
    .unwrap();

    assert!(matches!(
        codec.verify_access_token(&token),
        Err(AppError::InvalidToken)
    ));
}

#[test]
fn test_wrong_algorithm_rejected() {
    let (codec, config) = codec();
    let now = chrono::Utc::now().timestamp();

    let claims = WireClaims {
        sub: "user-123".to_string(),
        provider: "sms".to_string(),
        token_type: "access".to_string(),
        iss: "backend".to_string(),
        aud: "mobile".to_string(),
        iat: now,
        exp: now + 900,
    };
    let token = encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(&config.jwt_access_secret),
    )
    .unwrap();

    assert!(codec.verify_access_token(&token).is_err());
}

#[test]
fn test_unknown_provider_rejected() {
    let (codec, config) = codec();
    let now = chrono::Utc::now().timestamp();

    let claims = WireClaims {
        sub: "user-123".to_string(),
        provider: "facebook".to_string(),
        token_type: "access".to_string(),
        iss: "backend".to_string(),
        aud: "mobile".to_string(),
        iat: now,
        exp: now + 900,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&config.jwt_access_secret),
    )
    .unwrap();

    assert!(codec.verify_access_token(&token).is_err());
}

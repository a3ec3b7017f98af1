//! Application configuration loaded from environment variables.
//!
//! Every setting has a development fallback so a bare checkout starts up.
//! Production deployments must override both signing secrets.

use chrono::Duration;
use std::env;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_ACCESS_TOKEN_TTL: &str = "15m";
const DEFAULT_REFRESH_TOKEN_TTL: &str = "30d";
const DEFAULT_GOOGLE_VERIFY_TIMEOUT_MS: u64 = 5000;
/// Longest accepted token lifetime (100 years).
const MAX_TTL_SECS: i64 = 100 * 365 * 86_400;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend origin allowed by CORS
    pub frontend_url: String,

    // --- Token settings ---
    /// HS256 key for access tokens (raw bytes)
    pub jwt_access_secret: Vec<u8>,
    /// HMAC key for refresh-token fingerprints (raw bytes)
    pub jwt_refresh_secret: Vec<u8>,
    /// Access token lifetime as configured, e.g. "15m"
    pub access_token_ttl: String,
    /// Refresh token lifetime as configured, e.g. "30d"
    pub refresh_token_ttl: String,
    /// Revoke every descendant of a rotated token when it is presented again
    pub revoke_chain_on_reuse: bool,

    // --- Google sign-in ---
    /// OAuth client id that Google ID tokens must be issued for
    pub google_client_id: String,
    /// Upper bound on a single ID token verification
    pub google_verify_timeout_ms: u64,
}

impl Config {
    /// Config for tests with fixed secrets.
    pub fn test_default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frontend_url: "http://localhost:8081".to_string(),
            jwt_access_secret: b"test_access_key_32_bytes_minimum!".to_vec(),
            jwt_refresh_secret: b"test_refresh_key_32_bytes_minimum".to_vec(),
            access_token_ttl: DEFAULT_ACCESS_TOKEN_TTL.to_string(),
            refresh_token_ttl: DEFAULT_REFRESH_TOKEN_TTL.to_string(),
            revoke_chain_on_reuse: true,
            google_client_id: "test-client-id.apps.googleusercontent.com".to_string(),
            google_verify_timeout_ms: DEFAULT_GOOGLE_VERIFY_TIMEOUT_MS,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str, fallback: &str| non_blank_or(lookup(key), fallback);

        let access_token_ttl = read("ACCESS_TOKEN_TTL", DEFAULT_ACCESS_TOKEN_TTL);
        let refresh_token_ttl = read("REFRESH_TOKEN_TTL", DEFAULT_REFRESH_TOKEN_TTL);

        if parse_duration(&access_token_ttl).is_none() {
            return Err(ConfigError::InvalidDuration {
                key: "ACCESS_TOKEN_TTL",
                value: access_token_ttl,
            });
        }
        if parse_duration(&refresh_token_ttl).is_none() {
            tracing::warn!(
                value = %refresh_token_ttl,
                "REFRESH_TOKEN_TTL is not a valid duration, using {}",
                DEFAULT_REFRESH_TOKEN_TTL
            );
        }

        let revoke_chain_on_reuse = match lookup("REVOKE_CHAIN_ON_REUSE") {
            Some(v) if !v.trim().is_empty() => v
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidBool("REVOKE_CHAIN_ON_REUSE"))?,
            _ => true,
        };

        Ok(Self {
            port: parse_port(lookup("PORT").as_deref()),
            frontend_url: read("FRONTEND_URL", "http://localhost:8081"),
            jwt_access_secret: read("JWT_ACCESS_SECRET", "dev-access-secret-change-me")
                .into_bytes(),
            jwt_refresh_secret: read("JWT_REFRESH_SECRET", "dev-refresh-secret-change-me")
                .into_bytes(),
            access_token_ttl,
            refresh_token_ttl,
            revoke_chain_on_reuse,
            google_client_id: read("GOOGLE_CLIENT_ID", ""),
            google_verify_timeout_ms: lookup("GOOGLE_VERIFY_TIMEOUT_MS")
                .and_then(|v| v.trim().parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(DEFAULT_GOOGLE_VERIFY_TIMEOUT_MS),
        })
    }

    /// Access token lifetime.
    pub fn access_ttl(&self) -> Duration {
        parse_duration(&self.access_token_ttl).unwrap_or_else(|| Duration::minutes(15))
    }

    /// Refresh token lifetime, falling back to 30 days on a malformed value.
    pub fn refresh_ttl(&self) -> Duration {
        parse_duration(&self.refresh_token_ttl).unwrap_or_else(|| Duration::days(30))
    }

    pub fn google_verify_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.google_verify_timeout_ms)
    }
}

/// Parse a duration string of the form `<digits><s|m|h|d>`, e.g. `15m` or `30d`.
///
/// Lifetimes longer than 100 years are rejected so expiry arithmetic can
/// never overflow.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 {
        return None;
    }

    let (amount, unit) = value.split_at(value.len() - 1);
    if !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: i64 = amount.parse().ok()?;

    let seconds_per_unit = match unit.to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return None,
    };

    amount
        .checked_mul(seconds_per_unit)
        .filter(|secs| *secs <= MAX_TTL_SECS)
        .and_then(Duration::try_seconds)
}

fn non_blank_or(value: Option<String>, fallback: &str) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn parse_port(raw: Option<&str>) -> u16 {
    raw.and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|port| *port > 0)
        .unwrap_or(DEFAULT_PORT)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid duration for {key}: {value}")]
    InvalidDuration { key: &'static str, value: String },

    #[error("Invalid boolean for environment variable: {0}")]
    InvalidBool(&'static str),
}

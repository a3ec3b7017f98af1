//! User model for storage and API.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a user signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    Sms,
}

impl AuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthProvider::Google => "google",
            AuthProvider::Sms => "sms",
        }
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(AuthProvider::Google),
            "sms" => Ok(AuthProvider::Sms),
            _ => Err(AppError::Validation(
                "Auth provider must be google or sms.".to_string(),
            )),
        }
    }
}

/// Stored identity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    /// Google account subject (`sub` claim)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    pub auth_provider: AuthProvider,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// None until the first token issuance
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a user row is inserted. Timestamps are stamped by
/// the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub google_id: Option<String>,
    pub auth_provider: AuthProvider,
    pub is_active: bool,
}

/// The only fields that may change after a user is created.
///
/// `None` leaves a field untouched. The store applies a patch as one merge
/// and bumps `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub google_id: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn last_login(at: DateTime<Utc>) -> Self {
        Self {
            last_login_at: Some(at),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.google_id.is_none()
            && self.last_login_at.is_none()
            && self.is_active.is_none()
    }

    /// Merge into `user`, stamping `updated_at`.
    pub fn apply(self, user: &mut User, now: DateTime<Utc>) {
        if let Some(email) = self.email {
            user.email = Some(email);
        }
        if let Some(google_id) = self.google_id {
            user.google_id = Some(google_id);
        }
        if let Some(at) = self.last_login_at {
            user.last_login_at = Some(at);
        }
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
        user.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn provider_parsing() {
        assert_eq!("google".parse::<AuthProvider>().unwrap(), AuthProvider::Google);
        assert_eq!("sms".parse::<AuthProvider>().unwrap(), AuthProvider::Sms);

        let err = "facebook".parse::<AuthProvider>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn user_serializes_camel_case() {
        let now = Utc::now();
        let user = User {
            id: "u1".into(),
            email: None,
            phone_number: Some("+15551234567".into()),
            google_id: None,
            auth_provider: AuthProvider::Sms,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["phoneNumber"], "+15551234567");
        assert_eq!(json["authProvider"], "sms");
        assert_eq!(json["isActive"], true);
        assert!(json["lastLoginAt"].is_null());
        assert!(json.get("email").is_none());
    }

    #[test]
    fn patch_only_touches_named_fields() {
        let created = Utc::now() - chrono::Duration::hours(1);
        let mut user = User {
            id: "u1".into(),
            email: Some("a@x.com".into()),
            phone_number: None,
            google_id: Some("g1".into()),
            auth_provider: AuthProvider::Google,
            is_active: true,
            created_at: created,
            updated_at: created,
            last_login_at: None,
        };

        let now = Utc::now();
        UserPatch::last_login(now).apply(&mut user, now);

        assert_eq!(user.last_login_at, Some(now));
        assert_eq!(user.updated_at, now);
        assert_eq!(user.email.as_deref(), Some("a@x.com"));
        assert_eq!(user.google_id.as_deref(), Some("g1"));
        assert!(user.is_active);
    }
}

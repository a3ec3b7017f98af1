// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity resolution: map a login credential to a user record.
//!
//! There is no separate registration step. The first successful login with
//! a given email (Google) or phone number (SMS) creates the user.

use crate::db::UserStore;
use crate::error::{AppError, ErrorKind, Result};
use crate::models::{AuthProvider, NewUser, User};
use std::sync::Arc;

/// Credential fields presented at login or signup.
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub auth_provider: AuthProvider,
    /// Google account subject; required for Google, forbidden for SMS
    pub google_id: Option<String>,
}

impl CreateUserInput {
    pub fn google(email: impl Into<String>, google_id: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            phone_number: None,
            auth_provider: AuthProvider::Google,
            google_id: Some(google_id.into()),
        }
    }

    pub fn sms(phone_number: impl Into<String>) -> Self {
        Self {
            email: None,
            phone_number: Some(phone_number.into()),
            auth_provider: AuthProvider::Sms,
            google_id: None,
        }
    }

    /// Trim every identifier and drop the blank ones.
    fn normalized(self) -> Self {
        Self {
            email: non_blank(self.email),
            phone_number: non_blank(self.phone_number),
            auth_provider: self.auth_provider,
            google_id: non_blank(self.google_id),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.email.is_none() && self.phone_number.is_none() {
            return Err(AppError::Validation(
                "Email or phone number is required.".to_string(),
            ));
        }

        match self.auth_provider {
            AuthProvider::Google => {
                if self.email.is_none() {
                    return Err(AppError::Validation(
                        "Google login requires an email.".to_string(),
                    ));
                }
                if self.google_id.is_none() {
                    return Err(AppError::Validation(
                        "Google login requires a Google account id.".to_string(),
                    ));
                }
            }
            AuthProvider::Sms => {
                if self.phone_number.is_none() {
                    return Err(AppError::Validation(
                        "SMS login requires a phone number.".to_string(),
                    ));
                }
                if self.google_id.is_some() {
                    return Err(AppError::Validation(
                        "SMS login cannot carry a Google account id.".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Creates and looks up users by their natural keys.
#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserStore>,
}

impl IdentityService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Validate `input` and insert a new active user.
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User> {
        let input = input.normalized();
        input.validate()?;

        let user = self
            .users
            .create_user(NewUser {
                id: uuid::Uuid::new_v4().to_string(),
                email: input.email,
                phone_number: input.phone_number,
                google_id: input.google_id,
                auth_provider: input.auth_provider,
                is_active: true,
            })
            .await?;

        tracing::info!(
            user_id = %user.id,
            provider = %user.auth_provider,
            "Created user"
        );

        Ok(user)
    }

    /// Return the user owning the credential's natural key, creating one if
    /// none exists.
    ///
    /// The natural key is the email for Google and the phone number for SMS.
    /// A hit is returned as is: its provider and Google id are not compared
    /// with `input`. Google sign-in goes through
    /// `ExternalLoginService::link_profile`, which applies the cross-provider
    /// linking rules.
    pub async fn get_or_create_user(&self, input: CreateUserInput) -> Result<User> {
        let input = input.normalized();

        if let Some(existing) = self.find_by_natural_key(&input).await? {
            return Ok(existing);
        }

        match self.create_user(input.clone()).await {
            Ok(user) => Ok(user),
            // Another request created the same user between our lookup and insert.
            Err(e) if e.kind() == ErrorKind::Conflict => self
                .find_by_natural_key(&input)
                .await?
                .ok_or(e),
            Err(e) => Err(e),
        }
    }

    async fn find_by_natural_key(&self, input: &CreateUserInput) -> Result<Option<User>> {
        match input.auth_provider {
            AuthProvider::Google => match &input.email {
                Some(email) => self.users.get_user_by_email(email).await,
                None => Ok(None),
            },
            AuthProvider::Sms => match &input.phone_number {
                Some(phone) => self.users.get_user_by_phone_number(phone).await,
                None => Ok(None),
            },
        }
    }
}

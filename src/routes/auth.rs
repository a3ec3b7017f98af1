// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication routes: signup, Google login, refresh, logout.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{AuthProvider, TokenPair, User};
use crate::services::identity::CreateUserInput;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/users", post(create_user))
        .route("/auth/google", post(google_login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

/// Body for creating a user directly.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[validate(email(message = "Email must be a valid address."))]
    pub email: Option<String>,
    #[validate(length(min = 4, max = 32, message = "Phone number has an invalid length."))]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub auth_provider: String,
    pub google_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    #[serde(default)]
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    #[serde(default)]
    pub refresh_token: String,
}

/// Create a user record.
async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    body.validate().map_err(|errors| {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .next()
            .unwrap_or_else(|| "Invalid request.".to_string());
        AppError::Validation(message)
    })?;

    let auth_provider: AuthProvider = body.auth_provider.parse()?;

    let user = state
        .identity
        .create_user(CreateUserInput {
            email: body.email,
            phone_number: body.phone_number,
            auth_provider,
            google_id: body.google_id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange a Google ID token for a token pair.
async fn google_login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GoogleLoginRequest>,
) -> Result<Json<TokenPair>> {
    let pair = state
        .external_login
        .login_with_external_assertion(&body.id_token)
        .await?;
    Ok(Json(pair))
}

/// Rotate a refresh token and issue a new pair.
async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<TokenPair>> {
    if body.refresh_token.trim().is_empty() {
        return Err(AppError::Validation("Refresh token is required.".to_string()));
    }

    let pair = state
        .sessions
        .rotate_refresh_token(body.refresh_token.trim())
        .await?;
    Ok(Json(pair))
}

/// Revoke a refresh token. Always 204.
async fn logout(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshTokenRequest>,
) -> StatusCode {
    let token = body.refresh_token.trim();
    if !token.is_empty() {
        state.sessions.revoke_refresh_token(token).await;
    }
    StatusCode::NO_CONTENT
}

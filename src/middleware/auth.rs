// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access token authentication middleware.

use crate::error::AppError;
use crate::models::AuthProvider;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::sync::Arc;

/// Identity proven by a valid access token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: String,
    pub provider: AuthProvider,
}

/// Middleware that requires a valid bearer access token.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header.".to_string()))?;

    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header.".to_string()))?;

    let claims = state.codec.verify_access_token(token)?;

    request.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
        provider: claims.provider,
    });

    Ok(next.run(request).await)
}

/// Middleware that loads the authenticated user. Must run after
/// [`require_auth`].
pub async fn attach_user(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Missing authentication context.".to_string()))?;

    let user = state
        .users
        .get_user_by_id(&auth.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found.".to_string()))?;

    if !user.is_active {
        return Err(AppError::Forbidden("User is inactive.".to_string()));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

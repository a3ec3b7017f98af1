// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::middleware::auth::AuthContext;
use crate::models::User;
use crate::AppState;
use axum::{routing::get, Extension, Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// API routes (require authentication).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/me", get(get_me))
}

/// Current session response.
#[derive(Serialize)]
pub struct MeResponse {
    pub auth: AuthContext,
    pub user: User,
}

/// Who the access token belongs to.
async fn get_me(
    Extension(auth): Extension<AuthContext>,
    Extension(user): Extension<User>,
) -> Json<MeResponse> {
    Json(MeResponse { auth, user })
}

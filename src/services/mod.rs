// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod external_login;
pub mod google_identity;
pub mod identity;
pub mod replay;
pub mod session;
pub mod token_codec;

pub use external_login::{ExternalLoginDeps, ExternalLoginService};
pub use google_identity::{
    ExternalProfile, GoogleIdTokenVerifier, IdentityAssertionVerifier, VerificationError,
};
pub use identity::{CreateUserInput, IdentityService};
pub use replay::{InMemoryReplayCache, ReplayCache};
pub use session::SessionService;
pub use token_codec::{AccessTokenClaims, TokenCodec};

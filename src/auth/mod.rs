//! Request authentication and resource ownership.
//!
//! Protected requests pass through two stages before a handler touches the
//! store: the [`TokenVerifier`] turns the `Authorization` header into a
//! verified [`Principal`], then the [`OwnershipGuard`] compares that
//! principal with the owner the request asks to act on. Both stages fail
//! closed.

pub mod firebase;
pub mod guard;
pub mod provider;
pub mod verifier;

use serde::Serialize;
use thiserror::Error;

pub use firebase::FirebaseIdentityProvider;
pub use guard::{Decision, OwnerScope, OwnershipGuard};
pub use provider::{IdentityError, IdentityProvider, SharedSecretIdentityProvider, VerifiedClaims};
pub use verifier::TokenVerifier;

/// Verified identity of the caller for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub email: String,
    pub uid: String,
}

impl From<VerifiedClaims> for Principal {
    fn from(claims: VerifiedClaims) -> Self {
        Self {
            email: claims.email,
            uid: claims.uid,
        }
    }
}

/// Why a credential was not accepted. Both variants render as the same
/// generic 401 so callers cannot tell a missing token from a bad one.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

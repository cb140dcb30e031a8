use axum::http::HeaderValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::provider::{IdentityError, IdentityProvider};
use super::{AuthError, Principal};

/// Turns an `Authorization` header into a verified [`Principal`].
///
/// Anything short of a positive answer from the identity provider is a
/// rejection, including provider errors and timeouts.
#[derive(Clone)]
pub struct TokenVerifier {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
}

impl TokenVerifier {
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn verify(&self, header: Option<&HeaderValue>) -> Result<Principal, AuthError> {
        let token = extract_bearer(header)?;

        let claims = match tokio::time::timeout(self.timeout, self.provider.verify_token(token)).await {
            Ok(Ok(claims)) => claims,
            Ok(Err(IdentityError::Unavailable(reason))) => {
                warn!("Identity provider {} unavailable: {}", self.provider.name(), reason);
                return Err(AuthError::InvalidCredential("identity provider unavailable".to_string()));
            }
            Ok(Err(e)) => {
                warn!("Token rejected by {}: {}", self.provider.name(), e);
                return Err(AuthError::InvalidCredential(e.to_string()));
            }
            Err(_) => {
                warn!("Identity provider {} timed out after {:?}", self.provider.name(), self.timeout);
                return Err(AuthError::InvalidCredential("identity provider timed out".to_string()));
            }
        };

        Ok(Principal::from(claims))
    }
}

/// Extract the token from a `Bearer <token>` header value.
pub fn extract_bearer(header: Option<&HeaderValue>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;

    let auth_str = header
        .to_str()
        .map_err(|_| AuthError::InvalidCredential("header is not visible ASCII".to_string()))?;

    if auth_str.trim().is_empty() {
        return Err(AuthError::MissingCredential);
    }

    let mut parts = auth_str.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidCredential("authorization scheme must be Bearer".to_string()));
    }

    let token = parts.next().map(str::trim).unwrap_or_default();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::InvalidCredential("malformed bearer token".to_string()));
    }
    Ok(token)
}

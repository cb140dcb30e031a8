use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::auth::{Principal, TokenVerifier};
use crate::error::{ApiError, UNAUTHORIZED_MESSAGE};

/// Verify stage for protected routes.
///
/// Rejects the request with 401 before any handler runs unless the
/// `Authorization` header carries a token the identity provider accepts.
/// On success the [`Principal`] is stored in request extensions.
pub async fn require_principal(
    State(verifier): State<TokenVerifier>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = verifier.verify(request.headers().get(AUTHORIZATION)).await?;

    tracing::debug!("Authenticated {} via {}", principal.email, verifier.provider_name());
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

/// Handlers take `Principal` as an argument. A route mounted without the
/// verify stage has no principal and is rejected rather than run anonymously.
#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Principal>().cloned().ok_or_else(|| {
            tracing::error!("Principal requested on a route without the verify stage: {}", parts.uri.path());
            ApiError::unauthorized(UNAUTHORIZED_MESSAGE)
        })
    }
}

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims the identity provider vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub email: String,
    pub uid: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("token has no email claim")]
    MissingEmail,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// External service that checks bearer tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn verify_token(&self, token: &str) -> Result<VerifiedClaims, IdentityError>;
}

/// JWT claim set shared by both providers.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

impl TokenClaims {
    pub(crate) fn into_verified(self) -> Result<VerifiedClaims, IdentityError> {
        match self.email {
            Some(email) if !email.trim().is_empty() => Ok(VerifiedClaims { email, uid: self.sub }),
            _ => Err(IdentityError::MissingEmail),
        }
    }
}

/// HS256 tokens signed with a shared secret. Meant for local development and tests.
pub struct SharedSecretIdentityProvider {
    key: DecodingKey,
}

impl SharedSecretIdentityProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[async_trait]
impl IdentityProvider for SharedSecretIdentityProvider {
    fn name(&self) -> &'static str {
        "shared_secret"
    }

    async fn verify_token(&self, token: &str) -> Result<VerifiedClaims, IdentityError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<TokenClaims>(token, &self.key, &validation)
            .map_err(|e| IdentityError::Rejected(e.to_string()))?;
        data.claims.into_verified()
    }
}

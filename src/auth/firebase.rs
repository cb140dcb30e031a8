use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use tracing::debug;

use super::provider::{IdentityError, IdentityProvider, TokenClaims, VerifiedClaims};

/// Verifies Firebase ID tokens against Google's published signing keys.
///
/// The key set is fetched on every verification; nothing is cached between
/// requests.
pub struct FirebaseIdentityProvider {
    client: reqwest::Client,
    project_id: String,
    jwks_url: String,
}

impl FirebaseIdentityProvider {
    pub fn new(project_id: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), project_id, jwks_url)
    }

    pub fn with_client(client: reqwest::Client, project_id: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
            jwks_url: jwks_url.into(),
        }
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    async fn fetch_keys(&self) -> Result<JwkSet, IdentityError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("malformed key set: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn verify_token(&self, token: &str) -> Result<VerifiedClaims, IdentityError> {
        let header = decode_header(token).map_err(|e| IdentityError::Rejected(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::Rejected(format!("unexpected algorithm {:?}", header.alg)));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::Rejected("token header has no kid".to_string()))?;

        let keys = self.fetch_keys().await?;
        let jwk = keys
            .find(&kid)
            .ok_or_else(|| IdentityError::Rejected(format!("unknown signing key {}", kid)))?;
        let key = DecodingKey::from_jwk(jwk).map_err(|e| IdentityError::Rejected(e.to_string()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.project_id.as_str()]);
        validation.set_issuer(&[self.issuer()]);

        let data = decode::<TokenClaims>(token, &key, &validation).map_err(|e| IdentityError::Rejected(e.to_string()))?;
        debug!("Verified Firebase token for uid {}", data.claims.sub);
        data.claims.into_verified()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    // {"alg":"RS256","kid":"k1","typ":"JWT"} . {"sub":"u1","email":"a@x.com","exp":4102444800} . junk
    const RS256_TOKEN: &str = "eyJhbGciOiJSUzI1NiIsImtpZCI6ImsxIiwidHlwIjoiSldUIn0.\
                               eyJzdWIiOiJ1MSIsImVtYWlsIjoiYUB4LmNvbSIsImV4cCI6NDEwMjQ0NDgwMH0.c2ln";

    async fn serve_keys(body: serde_json::Value) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/jwks", get(move || async move { Json(body) }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/jwks", addr)
    }

    #[tokio::test]
    async fn rejects_non_rs256_tokens_without_fetching() {
        // Unroutable URL: if the provider fetched keys this would be Unavailable
        let provider = FirebaseIdentityProvider::new("skillverse", "http://127.0.0.1:9/jwks");
        let hs256 = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &json!({"sub": "u1", "email": "a@x.com", "exp": 4102444800u64}),
            &jsonwebtoken::EncodingKey::from_secret(b"x"),
        )
        .unwrap();
        assert!(matches!(provider.verify_token(&hs256).await, Err(IdentityError::Rejected(_))));
        assert!(matches!(provider.verify_token("garbage").await, Err(IdentityError::Rejected(_))));
    }

    #[tokio::test]
    async fn unreachable_key_endpoint_is_unavailable() {
        let port = portpicker::pick_unused_port().unwrap();
        let provider = FirebaseIdentityProvider::new("skillverse", format!("http://127.0.0.1:{}/jwks", port));
        assert!(matches!(
            provider.verify_token(RS256_TOKEN).await,
            Err(IdentityError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn malformed_key_set_is_unavailable() {
        let url = serve_keys(json!({"not": "a key set"})).await;
        let provider = FirebaseIdentityProvider::new("skillverse", url);
        assert!(matches!(
            provider.verify_token(RS256_TOKEN).await,
            Err(IdentityError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected() {
        let url = serve_keys(json!({"keys": []})).await;
        let provider = FirebaseIdentityProvider::new("skillverse", url);
        assert!(matches!(
            provider.verify_token(RS256_TOKEN).await,
            Err(IdentityError::Rejected(msg)) if msg.contains("k1")
        ));
    }

    #[test]
    fn issuer_is_project_scoped() {
        let provider = FirebaseIdentityProvider::new("skillverse-prod", "https://example.com/jwks");
        assert_eq!(provider.issuer(), "https://securetoken.google.com/skillverse-prod");
    }
}

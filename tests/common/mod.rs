#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use uuid::Uuid;

use skillverse_api::app::{router, AppState};
use skillverse_api::auth::provider::TokenClaims;
use skillverse_api::auth::{IdentityProvider, SharedSecretIdentityProvider, TokenVerifier};
use skillverse_api::config::AppConfig;
use skillverse_api::database::{
    Collection, Db, DocFilter, Document, DocumentStore, FindOptions, MemoryStore, StoreError,
};

pub const SECRET: &str = "integration-test-secret";

/// Memory store that records how often the handlers reached it.
#[derive(Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for CountingStore {
    fn backend_name(&self) -> &'static str {
        "counting-memory"
    }

    async fn find_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.find_one(collection, filter).await
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &DocFilter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.hit();
        self.inner.find_many(collection, filter, options).await
    }

    async fn count(&self, collection: Collection, filter: &DocFilter) -> Result<u64, StoreError> {
        self.hit();
        self.inner.count(collection, filter).await
    }

    async fn insert_one(&self, collection: Collection, doc: Document) -> Result<Uuid, StoreError> {
        self.hit();
        self.inner.insert_one(collection, doc).await
    }

    async fn update_set(&self, collection: Collection, filter: &DocFilter, fields: Document) -> Result<bool, StoreError> {
        self.hit();
        self.inner.update_set(collection, filter, fields).await
    }

    async fn update_inc(
        &self,
        collection: Collection,
        filter: &DocFilter,
        field: &str,
        delta: i64,
    ) -> Result<bool, StoreError> {
        self.hit();
        self.inner.update_inc(collection, filter, field, delta).await
    }

    async fn delete_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        self.hit();
        self.inner.delete_one(collection, filter).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
    pub store: Arc<CountingStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Serve the app on a free port, verifying HS256 tokens signed with [`SECRET`].
    pub async fn start() -> Result<Self> {
        Self::start_with_provider(Arc::new(SharedSecretIdentityProvider::new(SECRET)), Duration::from_secs(2)).await
    }

    pub async fn start_with_provider(provider: Arc<dyn IdentityProvider>, verify_timeout: Duration) -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let store = Arc::new(CountingStore::default());

        let mut config = AppConfig::development();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = port;

        let db = Db::new(store.clone(), Duration::from_millis(config.database.op_timeout_ms));
        let verifier = TokenVerifier::new(provider, verify_timeout);
        let app = router(AppState::new(db, verifier, config));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .context("failed to bind test server")?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            store,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn store_calls(&self) -> usize {
        self.store.calls()
    }

    /// Insert a course directly, bypassing HTTP and the call counter.
    pub async fn seed_course(&self, instructor: &str, title: &str, extra: Value) -> Result<Uuid> {
        let mut course = json!({
            "title": title,
            "instructorEmail": instructor,
            "instructorName": "Instructor",
            "category": "programming",
            "level": "beginner",
            "price": 10,
            "isFeatured": false,
            "enrollCount": 0,
            "reviewCount": 0,
            "ratingTotal": 0,
            "createdAt": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        });
        if let (Some(base), Value::Object(extra)) = (course.as_object_mut(), extra) {
            base.extend(extra);
        }
        let doc = course.as_object().cloned().unwrap_or_default();
        Ok(self.store.inner.insert_one(Collection::Courses, doc).await?)
    }

    pub async fn course(&self, id: Uuid) -> Result<Document> {
        self.store
            .inner
            .find_one(Collection::Courses, &DocFilter::by_id(id))
            .await?
            .context("course missing")
    }

    pub async fn count(&self, collection: Collection) -> Result<u64> {
        Ok(self.store.inner.count(collection, &DocFilter::new()).await?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Mint a bearer token for `email` that the test server accepts.
pub fn token(email: &str) -> String {
    let now = chrono::Utc::now();
    let claims = TokenClaims {
        sub: format!("uid-{}", email),
        email: Some(email.to_string()),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
        iat: Some(now.timestamp()),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
        .unwrap_or_else(|e| panic!("failed to sign test token: {e}"))
}

pub fn bearer(email: &str) -> String {
    format!("Bearer {}", token(email))
}

pub async fn body(res: reqwest::Response) -> Result<Value> {
    Ok(res.json::<Value>().await?)
}

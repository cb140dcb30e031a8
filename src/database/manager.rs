use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{DatabaseConfig, StoreBackend};

use super::{Collection, DocFilter, Document, DocumentStore, FindOptions, MemoryStore, PgDocumentStore, StoreError};

/// Shared store handle injected into every handler.
///
/// Cloning is cheap. Every operation is bounded by the configured timeout;
/// an expired timeout surfaces as [`StoreError::Timeout`].
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn DocumentStore>,
    op_timeout: Duration,
}

impl Db {
    pub fn new(store: Arc<dyn DocumentStore>, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    /// Build the configured backend. Postgres tables are created if missing.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn DocumentStore> = match config.backend {
            StoreBackend::Memory => {
                warn!("Using in-memory document store; data is lost on shutdown");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Postgres => {
                let store = PgDocumentStore::connect(config).await?;
                store.migrate().await?;
                Arc::new(store)
            }
        };
        info!("Document store backend: {}", store.backend_name());
        Ok(Self::new(store, Duration::from_millis(config.op_timeout_ms)))
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    async fn bounded<T>(&self, op: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Store operation exceeded {:?}", self.op_timeout);
                Err(StoreError::Timeout(self.op_timeout.as_millis() as u64))
            }
        }
    }

    pub async fn find_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        self.bounded(self.store.find_one(collection, filter)).await
    }

    /// Like [`Db::find_one`] but a missing document is [`StoreError::NotFound`].
    pub async fn find_404(&self, collection: Collection, filter: &DocFilter, what: &str) -> Result<Document, StoreError> {
        self.find_one(collection, filter)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} not found", what)))
    }

    pub async fn find_many(
        &self,
        collection: Collection,
        filter: &DocFilter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.bounded(self.store.find_many(collection, filter, options)).await
    }

    pub async fn count(&self, collection: Collection, filter: &DocFilter) -> Result<u64, StoreError> {
        self.bounded(self.store.count(collection, filter)).await
    }

    pub async fn insert_one(&self, collection: Collection, doc: Document) -> Result<Uuid, StoreError> {
        self.bounded(self.store.insert_one(collection, doc)).await
    }

    pub async fn update_set(&self, collection: Collection, filter: &DocFilter, fields: Document) -> Result<bool, StoreError> {
        self.bounded(self.store.update_set(collection, filter, fields)).await
    }

    pub async fn update_inc(
        &self,
        collection: Collection,
        filter: &DocFilter,
        field: &str,
        delta: i64,
    ) -> Result<bool, StoreError> {
        self.bounded(self.store.update_inc(collection, filter, field, delta)).await
    }

    pub async fn delete_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        self.bounded(self.store.delete_one(collection, filter)).await
    }

    pub async fn health_check(&self) -> Result<(), StoreError> {
        self.bounded(self.store.ping()).await
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

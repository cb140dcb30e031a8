pub mod filter;
pub mod manager;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub use filter::{Condition, DocFilter, FindOptions, SortDirection, SortKey};
pub use manager::Db;
pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

/// An unstructured stored document. The identifier is exposed as `_id`.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

/// The four logical collections the API reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Courses,
    Enrolled,
    Reviews,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Courses,
        Collection::Enrolled,
        Collection::Reviews,
        Collection::Users,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Courses => "courses",
            Collection::Enrolled => "enrolled",
            Collection::Reviews => "reviews",
            Collection::Users => "users",
        }
    }

    /// Field combinations that must be unique within the collection.
    pub fn unique_keys(&self) -> &'static [&'static [&'static str]] {
        match self {
            Collection::Enrolled => &[&["courseId", "enrolled_by"]],
            Collection::Users => &[&["email"]],
            Collection::Courses | Collection::Reviews => &[],
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate document in {collection}")]
    Duplicate { collection: Collection },

    #[error("Store operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Document-store operations consumed by the handlers.
///
/// Implementations must be safe for concurrent use; request tasks share one
/// instance through [`Db`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn find_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError>;

    async fn find_many(
        &self,
        collection: Collection,
        filter: &DocFilter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: Collection, filter: &DocFilter) -> Result<u64, StoreError>;

    /// Insert a document, returning its new id. Violating one of the
    /// collection's unique keys yields [`StoreError::Duplicate`] and writes nothing.
    async fn insert_one(&self, collection: Collection, doc: Document) -> Result<Uuid, StoreError>;

    /// Merge `fields` into the first matching document. Returns whether a document matched.
    async fn update_set(&self, collection: Collection, filter: &DocFilter, fields: Document) -> Result<bool, StoreError>;

    /// Add `delta` to a numeric field of the first matching document (missing counts as 0).
    async fn update_inc(
        &self,
        collection: Collection,
        filter: &DocFilter,
        field: &str,
        delta: i64,
    ) -> Result<bool, StoreError>;

    /// Delete the first matching document and return it.
    async fn delete_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self) {}
}

/// Field names are interpolated into SQL paths, so only identifiers are allowed.
pub fn validate_field_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(StoreError::InvalidField(name.to_string()));
    }
    Ok(())
}

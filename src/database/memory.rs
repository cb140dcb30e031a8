use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::filter::compare_values;
use super::{Collection, DocFilter, Document, DocumentStore, FindOptions, SortDirection, StoreError, ID_FIELD};

/// In-process document store used for local development and tests.
///
/// Documents keep insertion order per collection. Unique keys are checked
/// under the write lock, so concurrent duplicate inserts resolve to exactly
/// one success.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, Vec<(Uuid, Document)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_id(id: &Uuid, doc: &Document) -> Document {
        let mut out = doc.clone();
        out.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        out
    }

    fn violates_unique_key(collection: Collection, existing: &[(Uuid, Document)], doc: &Document) -> bool {
        collection.unique_keys().iter().any(|fields| {
            existing.iter().any(|(_, other)| {
                fields.iter().all(|f| match (doc.get(*f), other.get(*f)) {
                    (Some(a), Some(b)) => !a.is_null() && a == b,
                    _ => false,
                })
            })
        })
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        filter.validate()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .and_then(|docs| docs.iter().find(|(id, doc)| filter.matches(id, doc)))
            .map(|(id, doc)| Self::with_id(id, doc)))
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &DocFilter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        filter.validate()?;
        options.validate()?;

        let collections = self.collections.read().await;
        let mut matched: Vec<Document> = collections
            .get(&collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(id, doc)| filter.matches(id, doc))
                    .map(|(id, doc)| Self::with_id(id, doc))
                    .collect()
            })
            .unwrap_or_default();
        drop(collections);

        if !options.sort.is_empty() {
            // Stable sort keeps insertion order among equal keys
            matched.sort_by(|a, b| {
                for key in &options.sort {
                    let ord = compare_values(a.get(&key.field), b.get(&key.field));
                    let ord = match key.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options.limit.map_or(usize::MAX, |l| l as usize);
        Ok(matched.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: Collection, filter: &DocFilter) -> Result<u64, StoreError> {
        filter.validate()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map_or(0, |docs| docs.iter().filter(|(id, doc)| filter.matches(id, doc)).count() as u64))
    }

    async fn insert_one(&self, collection: Collection, mut doc: Document) -> Result<Uuid, StoreError> {
        doc.remove(ID_FIELD);
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection).or_default();
        if Self::violates_unique_key(collection, docs, &doc) {
            return Err(StoreError::Duplicate { collection });
        }
        let id = Uuid::new_v4();
        docs.push((id, doc));
        Ok(id)
    }

    async fn update_set(&self, collection: Collection, filter: &DocFilter, fields: Document) -> Result<bool, StoreError> {
        filter.validate()?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(false);
        };
        let Some(index) = docs.iter().position(|(id, doc)| filter.matches(id, doc)) else {
            return Ok(false);
        };

        let mut updated = docs[index].1.clone();
        for (key, value) in fields {
            if key != ID_FIELD {
                updated.insert(key, value);
            }
        }
        let others: Vec<(Uuid, Document)> = docs
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, entry)| entry.clone())
            .collect();
        if Self::violates_unique_key(collection, &others, &updated) {
            return Err(StoreError::Duplicate { collection });
        }
        docs[index].1 = updated;
        Ok(true)
    }

    async fn update_inc(
        &self,
        collection: Collection,
        filter: &DocFilter,
        field: &str,
        delta: i64,
    ) -> Result<bool, StoreError> {
        filter.validate()?;
        super::validate_field_name(field)?;
        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(&collection)
            .and_then(|docs| docs.iter_mut().find(|(id, doc)| filter.matches(id, doc)))
            .map(|(_, doc)| doc)
        else {
            return Ok(false);
        };

        let next = match doc.get(field) {
            Some(Value::Number(n)) if n.is_i64() => Value::from(n.as_i64().unwrap_or(0) + delta),
            Some(Value::Number(n)) => Value::from(n.as_f64().unwrap_or(0.0) + delta as f64),
            _ => Value::from(delta),
        };
        doc.insert(field.to_string(), next);
        Ok(true)
    }

    async fn delete_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        filter.validate()?;
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(&collection) else {
            return Ok(None);
        };
        Ok(docs
            .iter()
            .position(|(id, doc)| filter.matches(id, doc))
            .map(|index| {
                let (id, doc) = docs.remove(index);
                Self::with_id(&id, &doc)
            }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

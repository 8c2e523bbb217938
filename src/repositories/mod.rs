use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::errors::ServiceError;

pub mod order_repository;
pub mod sql_store;
pub mod user_repository;

pub use order_repository::{DocumentOrderRepository, OrderRepository, ORDERS_COLLECTION};
pub use sql_store::SqlDocumentStore;
pub use user_repository::{DocumentUserRepository, UserRepository, USERS_COLLECTION};

/// Top-level fields of a stored record.
pub type Fields = Map<String, Value>;

/// A record read back from a [`DocumentStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// The stored fields with `id` added, ready for deserialization.
    pub fn into_record(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

/// Durable collection/record store backing orders and users.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a new record and returns the id assigned to it.
    async fn create(&self, collection: &str, record: Fields) -> Result<String, ServiceError>;

    /// Stores a record under a known id, replacing any previous body.
    async fn put(&self, collection: &str, id: &str, record: Fields) -> Result<(), ServiceError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ServiceError>;

    /// Shallow merge of `fields` into the record; untouched fields keep their
    /// stored values.
    async fn update(&self, collection: &str, id: &str, fields: Fields)
        -> Result<(), ServiceError>;

    /// Records whose top-level `field` equals `value`, in insertion order.
    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, ServiceError>;

    /// Every record of the collection, in insertion order.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError>;
}

/// Converts a serializable value into top-level fields.
pub fn to_fields<T: serde::Serialize>(value: &T) -> Result<Fields, ServiceError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(ServiceError::SerializationError(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Merges `patch` into `target` at the top level only.
fn merge_fields(target: &mut Fields, patch: Fields) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    document: Document,
}

/// Process-local store used by tests and the demo wiring.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: DashMap<(String, String), StoredDocument>,
    next_seq: AtomicU64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }

    fn collect<F>(&self, collection: &str, mut keep: F) -> Vec<Document>
    where
        F: FnMut(&Document) -> bool,
    {
        let mut matches: Vec<StoredDocument> = self
            .documents
            .iter()
            .filter(|entry| entry.key().0 == collection && keep(&entry.value().document))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|stored| stored.seq);
        matches.into_iter().map(|stored| stored.document).collect()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, collection: &str, record: Fields) -> Result<String, ServiceError> {
        let id = Uuid::new_v4().to_string();
        self.put(collection, &id, record).await?;
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, mut record: Fields) -> Result<(), ServiceError> {
        record.remove("id");
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let key = Self::key(collection, id);
        match self.documents.get_mut(&key) {
            Some(mut existing) => existing.document.fields = record,
            None => {
                self.documents.insert(
                    key,
                    StoredDocument {
                        seq,
                        document: Document {
                            id: id.to_string(),
                            fields: record,
                            created_at: Utc::now(),
                        },
                    },
                );
            }
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ServiceError> {
        Ok(self
            .documents
            .get(&Self::key(collection, id))
            .map(|entry| entry.document.clone()))
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut fields: Fields,
    ) -> Result<(), ServiceError> {
        fields.remove("id");
        let mut entry = self
            .documents
            .get_mut(&Self::key(collection, id))
            .ok_or_else(|| ServiceError::NotFound(format!("{}/{} not found", collection, id)))?;
        merge_fields(&mut entry.document.fields, fields);
        Ok(())
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, ServiceError> {
        Ok(self.collect(collection, |doc| doc.fields.get(field) == Some(value)))
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError> {
        Ok(self.collect(collection, |_| true))
    }
}

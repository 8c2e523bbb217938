use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, Set, Statement, Value as DbValue,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use super::{Document, DocumentStore, Fields};
use crate::entities::document::{
    ActiveModel as DocumentActiveModel, Column, Entity as DocumentEntity, Model as DocumentModel,
};
use crate::errors::ServiceError;

/// [`DocumentStore`] over the `documents` table (sqlite or postgres).
#[derive(Debug, Clone)]
pub struct SqlDocumentStore {
    db: Arc<DatabaseConnection>,
}

impl SqlDocumentStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn to_document(model: DocumentModel) -> Result<Document, ServiceError> {
        match model.body {
            Value::Object(fields) => Ok(Document {
                id: model.id,
                fields,
                created_at: model.created_at,
            }),
            other => Err(ServiceError::SerializationError(format!(
                "document {}/{} has a non-object body: {}",
                model.collection, model.id, other
            ))),
        }
    }

    async fn find_collection(&self, collection: &str) -> Result<Vec<DocumentModel>, ServiceError> {
        DocumentEntity::find()
            .filter(Column::Collection.eq(collection))
            .order_by_asc(Column::CreatedAt)
            .order_by_asc(Column::Id)
            .all(self.get_db())
            .await
            .map_err(|e| {
                error!(collection, "Failed to load collection: {}", e);
                ServiceError::DatabaseError(e)
            })
    }
}

/// Builds the in-database shallow merge of `fields` into one document body.
///
/// sqlite sets each top-level key with `json_set`; postgres concatenates
/// `jsonb` objects, where the right-hand keys win.
fn merge_statement(
    backend: DbBackend,
    collection: &str,
    id: &str,
    fields: Fields,
) -> Result<Statement, ServiceError> {
    let now = Utc::now();
    match backend {
        DbBackend::Sqlite => {
            let mut setters = String::new();
            let mut values: Vec<DbValue> = Vec::with_capacity(fields.len() * 2 + 3);
            for (key, value) in fields {
                if key.contains('"') {
                    return Err(ServiceError::InvalidInput(format!(
                        "field name {:?} cannot be stored",
                        key
                    )));
                }
                setters.push_str(", ?, json(?)");
                values.push(format!("$.\"{}\"", key).into());
                values.push(value.to_string().into());
            }
            values.extend([DbValue::from(now), DbValue::from(collection), DbValue::from(id)]);
            Ok(Statement::from_sql_and_values(
                backend,
                format!(
                    "UPDATE documents SET body = json_set(body{}), updated_at = ? \
                     WHERE collection = ? AND id = ?",
                    setters
                ),
                values,
            ))
        }
        DbBackend::Postgres => Ok(Statement::from_sql_and_values(
            backend,
            "UPDATE documents SET body = (body::jsonb || $1::jsonb)::json, updated_at = $2 \
             WHERE collection = $3 AND id = $4",
            [
                DbValue::from(Value::Object(fields).to_string()),
                now.into(),
                collection.into(),
                id.into(),
            ],
        )),
        other => Err(ServiceError::InternalError(format!(
            "unsupported database backend: {:?}",
            other
        ))),
    }
}

#[async_trait]
impl DocumentStore for SqlDocumentStore {
    async fn create(&self, collection: &str, record: Fields) -> Result<String, ServiceError> {
        let id = Uuid::new_v4().to_string();
        let mut record = record;
        record.remove("id");
        let now = Utc::now();

        let model = DocumentActiveModel {
            collection: Set(collection.to_string()),
            id: Set(id.clone()),
            body: Set(Value::Object(record)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        model.insert(self.get_db()).await?;

        debug!(collection, %id, "Document created");
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, mut record: Fields) -> Result<(), ServiceError> {
        record.remove("id");
        let now = Utc::now();

        let model = DocumentActiveModel {
            collection: Set(collection.to_string()),
            id: Set(id.to_string()),
            body: Set(Value::Object(record)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        DocumentEntity::insert(model)
            .on_conflict(
                OnConflict::columns([Column::Collection, Column::Id])
                    .update_columns([Column::Body, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(self.get_db())
            .await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, ServiceError> {
        DocumentEntity::find_by_id((collection.to_string(), id.to_string()))
            .one(self.get_db())
            .await?
            .map(Self::to_document)
            .transpose()
    }

    /// Merges `fields` into the stored body with a single `UPDATE`, so two
    /// writers touching different top-level fields never overwrite each other.
    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut fields: Fields,
    ) -> Result<(), ServiceError> {
        fields.remove("id");
        let backend = self.get_db().get_database_backend();
        let statement = merge_statement(backend, collection, id, fields)?;

        let result = self.get_db().execute(statement).await.map_err(|e| {
            error!(collection, id, "Failed to update document: {}", e);
            ServiceError::DatabaseError(e)
        })?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!("{}/{} not found", collection, id)));
        }
        debug!(collection, id, "Document updated");
        Ok(())
    }

    async fn query_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, ServiceError> {
        // JSON operators differ between sqlite and postgres; filter after loading.
        self.find_collection(collection)
            .await?
            .into_iter()
            .filter(|model| model.body.get(field) == Some(value))
            .map(Self::to_document)
            .collect()
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, ServiceError> {
        self.find_collection(collection)
            .await?
            .into_iter()
            .map(Self::to_document)
            .collect()
    }
}

use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{to_fields, Document, DocumentStore, Fields};
use crate::errors::ServiceError;
use crate::models::{NewOrder, Order, OrderStatus, PaymentRecord};

pub const ORDERS_COLLECTION: &str = "orders";

const READ_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Persistence interface for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order and assigns its id. Never retried.
    async fn create(&self, order: NewOrder) -> Result<Order, ServiceError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    /// Orders placed by `user_id`, newest first.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError>;

    /// Every order, newest first.
    async fn list_all(&self) -> Result<Vec<Order>, ServiceError>;

    /// Overwrites only the order's lifecycle status.
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<(), ServiceError>;

    /// Overwrites only the order's payment sub-record.
    async fn update_payment(&self, id: Uuid, payment: &PaymentRecord) -> Result<(), ServiceError>;
}

/// [`OrderRepository`] over any [`DocumentStore`].
///
/// Every store call is bounded by `timeout`. Single-order reads are retried
/// `read_retry_attempts` extra times on transient errors.
#[derive(Clone)]
pub struct DocumentOrderRepository {
    store: Arc<dyn DocumentStore>,
    timeout: Duration,
    read_retry_attempts: u32,
}

impl DocumentOrderRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            timeout: Duration::from_secs(15),
            read_retry_attempts: 2,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_read_retries(mut self, attempts: u32) -> Self {
        self.read_retry_attempts = attempts;
        self
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>> + Send,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| {
                ServiceError::Timeout(format!(
                    "order repository {} exceeded {:?}",
                    operation, self.timeout
                ))
            })?
    }

    fn decode(document: Document) -> Result<Order, ServiceError> {
        let id = document.id.clone();
        serde_json::from_value(document.into_record()).map_err(|e| {
            ServiceError::SerializationError(format!("order {} is malformed: {}", id, e))
        })
    }

    fn decode_all(documents: Vec<Document>) -> Result<Vec<Order>, ServiceError> {
        let mut orders = documents
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<_>, _>>()?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn write_field(&self, id: Uuid, field: &str, value: Value) -> Result<(), ServiceError> {
        let mut fields = Fields::new();
        fields.insert(field.to_string(), value);
        self.bounded(
            "update",
            self.store
                .update(ORDERS_COLLECTION, &id.to_string(), fields),
        )
        .await
        .map_err(|e| match e {
            ServiceError::NotFound(_) => ServiceError::NotFound(format!("Order {} not found", id)),
            other => other,
        })
    }
}

#[async_trait]
impl OrderRepository for DocumentOrderRepository {
    #[instrument(skip(self, order), fields(user_id = %order.user_id, total = %order.total))]
    async fn create(&self, order: NewOrder) -> Result<Order, ServiceError> {
        let fields = to_fields(&order)?;
        let id = self
            .bounded("create", self.store.create(ORDERS_COLLECTION, fields))
            .await?;
        let id = Uuid::parse_str(&id).map_err(|e| {
            ServiceError::InternalError(format!("store assigned a non-uuid order id {}: {}", id, e))
        })?;
        debug!(order_id = %id, "Order stored");
        Ok(order.with_id(id))
    }

    #[instrument(skip(self))]
    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        let key = id.to_string();
        let mut attempt = 0;
        loop {
            match self
                .bounded("get", self.store.get(ORDERS_COLLECTION, &key))
                .await
            {
                Ok(document) => return document.map(Self::decode).transpose(),
                Err(e) if e.is_transient() && attempt < self.read_retry_attempts => {
                    attempt += 1;
                    warn!(order_id = %id, attempt, "Retrying order read: {}", e);
                    tokio::time::sleep(READ_RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError> {
        let documents = self
            .bounded(
                "query",
                self.store
                    .query_by_field(ORDERS_COLLECTION, "userId", &json!(user_id)),
            )
            .await?;
        Self::decode_all(documents)
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Order>, ServiceError> {
        let documents = self
            .bounded("list", self.store.list(ORDERS_COLLECTION))
            .await?;
        Self::decode_all(documents)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<(), ServiceError> {
        self.write_field(id, "status", serde_json::to_value(status)?)
            .await
    }

    #[instrument(skip(self, payment), fields(payment_status = %payment.status))]
    async fn update_payment(&self, id: Uuid, payment: &PaymentRecord) -> Result<(), ServiceError> {
        self.write_field(id, "payment", serde_json::to_value(payment)?)
            .await
    }
}

use std::sync::Arc;

use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{require_admin, Identity},
    errors::ServiceError,
    models::{Order, User},
    repositories::OrderRepository,
};

/// Read side of orders for shoppers and the admin dashboard.
#[derive(Clone)]
pub struct OrderQueryService {
    orders: Arc<dyn OrderRepository>,
}

impl OrderQueryService {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// An order as seen by its owner. Orders of other shoppers are
    /// reported as not found.
    #[instrument(skip(self, viewer), fields(user_id = %viewer.user_id))]
    pub async fn get_for_user(&self, order_id: Uuid, viewer: &Identity) -> Result<Order, ServiceError> {
        let order = self.get_by_id(order_id).await?;
        if order.user_id != viewer.user_id {
            warn!(%order_id, "Order requested by a different user");
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        Ok(order)
    }

    /// The shopper's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, ServiceError> {
        self.orders.list_for_user(user_id).await
    }

    /// Every order, newest first. Admin only.
    #[instrument(skip(self, acting), fields(acting_user = %acting.id))]
    pub async fn list_all(&self, acting: &User) -> Result<Vec<Order>, ServiceError> {
        require_admin(acting)?;
        self.orders.list_all().await
    }
}

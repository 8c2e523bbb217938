use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::require_admin,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Order, OrderStatus, PaymentStatus, User},
    repositories::{OrderRepository, UserRepository},
};

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatistics {
    /// Sum of order totals regardless of status.
    pub total_revenue: Decimal,
    pub total_orders: usize,
    pub pending_orders: usize,
    pub processing_orders: usize,
    pub shipped_orders: usize,
    pub completed_orders: usize,
    pub cancelled_orders: usize,
}

impl OrderStatistics {
    pub fn from_orders(orders: &[Order]) -> Self {
        orders.iter().fold(Self::default(), |mut stats, order| {
            stats.total_orders += 1;
            stats.total_revenue = stats.total_revenue.saturating_add(order.total);
            match order.status {
                OrderStatus::Pending => stats.pending_orders += 1,
                OrderStatus::Processing => stats.processing_orders += 1,
                OrderStatus::Shipped => stats.shipped_orders += 1,
                OrderStatus::Completed => stats.completed_orders += 1,
                OrderStatus::Cancelled => stats.cancelled_orders += 1,
            }
            stats
        })
    }
}

/// Admin-driven order and payment status changes.
///
/// Any status may move to any other. Each change reads the order and then
/// overwrites the one field it changes; two admins writing the same field
/// concurrently resolve as last write wins.
#[derive(Clone)]
pub struct OrderStatusService {
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserRepository>,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserRepository>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            orders,
            users,
            event_sender,
        }
    }

    async fn fetch(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Sets the fulfillment status. Setting the current status is a no-op.
    #[instrument(skip(self, acting), fields(acting_user = %acting.id, order_id = %order_id, new_status = %new_status))]
    pub async fn set_order_status(
        &self,
        acting: &User,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<Order, ServiceError> {
        require_admin(acting)?;
        let mut order = self.fetch(order_id).await?;
        let old_status = order.status;

        if old_status == new_status {
            return Ok(order);
        }
        if old_status.is_terminal() {
            warn!(%old_status, "Moving order out of a terminal status");
        }

        self.orders.update_status(order_id, new_status).await?;
        order.status = new_status;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            })
            .await;

        info!(%old_status, "Order status updated");
        Ok(order)
    }

    /// Sets the payment status, keeping the method-specific details.
    /// Setting the current status is a no-op.
    #[instrument(skip(self, acting), fields(acting_user = %acting.id, order_id = %order_id, new_status = %new_status))]
    pub async fn set_payment_status(
        &self,
        acting: &User,
        order_id: Uuid,
        new_status: PaymentStatus,
    ) -> Result<Order, ServiceError> {
        require_admin(acting)?;
        let mut order = self.fetch(order_id).await?;
        let old_status = order.payment.status;

        if old_status == new_status {
            return Ok(order);
        }

        let mut payment = order.payment.clone();
        payment.status = new_status;
        self.orders.update_payment(order_id, &payment).await?;
        order.payment = payment;

        self.event_sender
            .send_or_log(Event::PaymentStatusChanged {
                order_id,
                method: order.payment.method(),
                old_status,
                new_status,
            })
            .await;

        info!(%old_status, "Payment status updated");
        Ok(order)
    }

    #[instrument(skip(self, acting), fields(acting_user = %acting.id))]
    pub async fn statistics(&self, acting: &User) -> Result<OrderStatistics, ServiceError> {
        require_admin(acting)?;
        let orders = self.orders.list_all().await?;
        Ok(OrderStatistics::from_orders(&orders))
    }

    #[instrument(skip(self, acting), fields(acting_user = %acting.id))]
    pub async fn list_users(&self, acting: &User) -> Result<Vec<User>, ServiceError> {
        require_admin(acting)?;
        self.users.list_all().await
    }
}

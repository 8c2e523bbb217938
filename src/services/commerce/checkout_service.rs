use crate::{
    auth::Identity,
    dto::CheckoutForm,
    errors::{CheckoutError, FieldViolation},
    events::{Event, EventSender},
    models::{NewOrder, Order, OrderItem, OrderStatus, PaymentRecord},
    notifications::{Notifier, OrderConfirmation},
    repositories::OrderRepository,
    services::commerce::CartService,
    services::payments::{PaymentCoordinator, PaymentDetails, PaymentError, PaymentOutcome},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Result of a committed checkout.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    /// The order with the payment record as written by the coordinator.
    pub order: Order,
    /// Whether the confirmation notification went out.
    pub notification_sent: bool,
}

impl CheckoutReceipt {
    pub fn order_id(&self) -> Uuid {
        self.order.id
    }
}

/// Turns a cart into an order and runs its payment.
///
/// The order is created before payment is attempted and is never rolled
/// back. The cart is cleared only once payment completed or instructions
/// were issued; a failed notification does not fail the checkout.
#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<PaymentCoordinator>,
    notifier: Arc<dyn Notifier>,
    event_sender: Arc<EventSender>,
    currency: String,
    notification_timeout: Duration,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        payments: Arc<PaymentCoordinator>,
        notifier: Arc<dyn Notifier>,
        event_sender: Arc<EventSender>,
        currency: impl Into<String>,
        notification_timeout: Duration,
    ) -> Self {
        Self {
            orders,
            payments,
            notifier,
            event_sender,
            currency: currency.into(),
            notification_timeout,
        }
    }

    /// Places an order for the cart's contents.
    ///
    /// Checks run in order: signed in, non-empty cart, valid form. Nothing is
    /// written until all three pass.
    #[instrument(skip(self, form, cart, user), fields(method = %form.payment_method))]
    pub async fn submit_order(
        &self,
        form: &CheckoutForm,
        cart: &CartService,
        user: Option<&Identity>,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let user = user.ok_or(CheckoutError::Unauthenticated)?;

        let snapshot = cart.snapshot().await;
        if snapshot.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut violations = form.violations();
        if !self.payments.supports(form.payment_method) {
            violations.push(FieldViolation::new(
                "paymentMethod",
                format!("{} is not available", form.payment_method),
            ));
        }
        if !violations.is_empty() {
            return Err(CheckoutError::InvalidInput(violations));
        }

        let items: Vec<OrderItem> = snapshot.items.iter().map(OrderItem::from).collect();
        let total = OrderItem::total_of(&items).ok_or_else(|| {
            CheckoutError::InvalidInput(vec![FieldViolation::new(
                "cart",
                "Cart total is larger than can be charged",
            )])
        })?;

        let new_order = NewOrder {
            user_id: user.user_id.clone(),
            user_email: user.email.clone(),
            items,
            delivery: form.delivery(),
            payment: PaymentRecord::pending(form.payment_method, total),
            total,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        };

        let order = self.orders.create(new_order).await.map_err(|e| {
            error!("Order creation failed: {}", e);
            CheckoutError::OrderCreationFailed(e)
        })?;
        info!(order_id = %order.id, %total, "Order created");

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id: order.user_id.clone(),
            })
            .await;

        let details = form.payment_details();
        let order = self.pay(order, &details).await?;
        let notification_sent = self.notify(&order, &form.normalized().email).await;
        self.finish(&order, Some(cart)).await;

        Ok(CheckoutReceipt {
            order,
            notification_sent,
        })
    }

    /// Retries payment for an order of `user` whose payment has not
    /// completed, then finishes checkout like [`CheckoutService::submit_order`].
    ///
    /// The cart is cleared only if it still holds exactly the order's items.
    #[instrument(skip(self, details, cart, user))]
    pub async fn retry_payment(
        &self,
        order_id: Uuid,
        details: &PaymentDetails,
        cart: &CartService,
        user: Option<&Identity>,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        let user = user.ok_or(CheckoutError::Unauthenticated)?;

        let owned = self
            .orders
            .get(order_id)
            .await
            .map_err(|e| provider_error(order_id, details, PaymentError::Repository(e)))?
            .filter(|order| order.user_id == user.user_id);
        if owned.is_none() {
            // Other shoppers' orders are reported as missing.
            return Err(provider_error(
                order_id,
                details,
                PaymentError::OrderNotFound(order_id),
            ));
        }

        let (order, outcome) = self
            .payments
            .retry_payment(order_id, details)
            .await
            .map_err(|e| provider_error(order_id, details, e))?;

        let order = apply_outcome(order, outcome)?;
        let notification_sent = self.notify(&order, &order.user_email).await;

        // Only a cart that still holds exactly the order's lines is emptied.
        let current: Vec<OrderItem> = cart.snapshot().await.items.iter().map(OrderItem::from).collect();
        let unchanged = current == order.items;
        if !unchanged {
            info!(%order_id, "Cart changed since the order was placed, keeping it");
        }
        self.finish(&order, unchanged.then_some(cart)).await;

        Ok(CheckoutReceipt {
            order,
            notification_sent,
        })
    }

    async fn pay(&self, order: Order, details: &PaymentDetails) -> Result<Order, CheckoutError> {
        let outcome = self
            .payments
            .process(&order, details)
            .await
            .map_err(|e| provider_error(order.id, details, e))?;
        apply_outcome(order, outcome)
    }

    /// Best effort: failures are logged and reported as an event.
    async fn notify(&self, order: &Order, email: &str) -> bool {
        let confirmation = OrderConfirmation::from_order(order, &self.currency);
        let result = tokio::time::timeout(
            self.notification_timeout,
            self.notifier.send_order_confirmation(&confirmation, email),
        )
        .await;

        let reason = match result {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.notification_timeout),
        };

        warn!(order_id = %order.id, %reason, "Order confirmation could not be sent");
        self.event_sender
            .send_or_log(Event::NotificationFailed {
                order_id: order.id,
                reason,
            })
            .await;
        false
    }

    async fn finish(&self, order: &Order, cart: Option<&CartService>) {
        if let Some(cart) = cart {
            if let Err(e) = cart.clear().await {
                // The order stands; the shopper can empty the cart by hand.
                error!(order_id = %order.id, "Failed to clear cart after checkout: {}", e);
            }
        }

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                order_id: order.id,
                method: order.payment.method(),
            })
            .await;
        info!(order_id = %order.id, payment_status = %order.payment.status, "Checkout completed");
    }
}

fn provider_error(order_id: Uuid, details: &PaymentDetails, e: PaymentError) -> CheckoutError {
    error!(%order_id, method = %details.method(), "Payment could not be processed: {}", e);
    CheckoutError::PaymentProviderError {
        order_id,
        method: details.method(),
        cause: e.to_string(),
    }
}

/// Folds a payment outcome into the order, or maps it to the checkout error
/// that stops the flow before the cart is cleared.
fn apply_outcome(mut order: Order, outcome: PaymentOutcome) -> Result<Order, CheckoutError> {
    match outcome {
        PaymentOutcome::Failed { reason, .. } => Err(CheckoutError::PaymentFailed {
            order_id: order.id,
            reason,
        }),
        PaymentOutcome::Abandoned { .. } => {
            Err(CheckoutError::PaymentIncomplete { order_id: order.id })
        }
        committed => {
            if let Some(record) = committed.record(order.total) {
                order.payment = record;
            }
            Ok(order)
        }
    }
}

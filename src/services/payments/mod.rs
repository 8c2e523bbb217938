//! Payment coordinator and its method variants.
//!
//! A variant talks to its provider and reports a [`PaymentOutcome`]; the
//! coordinator turns that outcome into the order's payment sub-record. The
//! order's lifecycle status is never touched here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{Order, PaymentMethod, PaymentRecord, PaymentStatus, ProviderDetails};
use crate::repositories::OrderRepository;

pub mod bank_transfer;
pub mod card;
pub mod gateway;
pub mod paystack;
pub mod ussd;

pub use bank_transfer::BankTransferProcessor;
pub use card::CardPaymentProcessor;
pub use gateway::{CardGateway, GatewayCheckout, GatewayEvent, GatewayHandle, WidgetGateway};
pub use paystack::{PaystackClient, TransactionVerifier, VerifiedTransaction};
pub use ussd::UssdProcessor;

/// Card data typed into the checkout form.
#[derive(Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub card_number: String,
    pub expiry: String,
    pub cvc: String,
}

impl CardDetails {
    pub fn last4(&self) -> String {
        let digits: Vec<char> = self.card_number.chars().filter(char::is_ascii_digit).collect();
        digits[digits.len().saturating_sub(4)..].iter().collect()
    }
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("last4", &self.last4())
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

/// Method-specific input for a payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDetails {
    Card(CardDetails),
    BankTransfer,
    Ussd,
}

impl PaymentDetails {
    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Card(_) => PaymentMethod::Card,
            Self::BankTransfer => PaymentMethod::BankTransfer,
            Self::Ussd => PaymentMethod::Ussd,
        }
    }
}

/// What a payment variant reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Funds confirmed by the provider.
    Completed { details: ProviderDetails },
    /// Instructions issued; confirmation happens out of band.
    AwaitingConfirmation { details: ProviderDetails },
    /// The provider explicitly declined.
    Failed {
        details: ProviderDetails,
        reason: String,
    },
    /// The shopper left without completing. Nothing is written.
    Abandoned { reference: String },
}

impl PaymentOutcome {
    /// Status written to the order, `None` when the record is left as is.
    pub fn status(&self) -> Option<PaymentStatus> {
        match self {
            Self::Completed { .. } => Some(PaymentStatus::Completed),
            Self::AwaitingConfirmation { .. } => Some(PaymentStatus::Pending),
            Self::Failed { .. } => Some(PaymentStatus::Failed),
            Self::Abandoned { .. } => None,
        }
    }

    fn details(&self) -> Option<&ProviderDetails> {
        match self {
            Self::Completed { details }
            | Self::AwaitingConfirmation { details }
            | Self::Failed { details, .. } => Some(details),
            Self::Abandoned { .. } => None,
        }
    }

    /// Payment sub-record this outcome writes for an order of `amount`.
    pub fn record(&self, amount: Decimal) -> Option<PaymentRecord> {
        Some(PaymentRecord {
            amount,
            status: self.status()?,
            details: self.details()?.clone(),
        })
    }

    /// Whether checkout may go on to notify the shopper and clear the cart.
    pub fn commits_checkout(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::AwaitingConfirmation { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Payment provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Payment details for {given} do not match the order's method {expected}")]
    MethodMismatch {
        expected: PaymentMethod,
        given: PaymentMethod,
    },

    #[error("No payment processor registered for {0}")]
    UnsupportedMethod(PaymentMethod),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Order {0} is already paid")]
    AlreadyCompleted(Uuid),

    #[error("Recording payment failed: {0}")]
    Repository(#[from] ServiceError),
}

/// One payment method's provider interaction.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Longest time the interaction may take, provider round trips included.
    fn deadline(&self) -> Duration;

    async fn process(
        &self,
        order: &Order,
        details: &PaymentDetails,
    ) -> Result<PaymentOutcome, PaymentError>;
}

/// `ORD-<order id>-<unix millis>`
pub fn payment_reference(order_id: Uuid, at: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", order_id, at.timestamp_millis())
}

/// Amount in the currency's minor unit (kobo, cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, PaymentError> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| PaymentError::Provider(format!("amount {} is out of range", amount)))
}

pub(crate) fn ensure_method(
    order: &Order,
    details: &PaymentDetails,
) -> Result<(), PaymentError> {
    let expected = order.payment.method();
    let given = details.method();
    if expected != given {
        return Err(PaymentError::MethodMismatch { expected, given });
    }
    Ok(())
}

pub(crate) async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, PaymentError>
where
    F: Future<Output = Result<T, PaymentError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PaymentError::Timeout(limit))?
}

/// Dispatches to the variant for the order's method and records the result.
#[derive(Clone)]
pub struct PaymentCoordinator {
    processors: HashMap<PaymentMethod, Arc<dyn PaymentProcessor>>,
    orders: Arc<dyn OrderRepository>,
    event_sender: Option<Arc<EventSender>>,
    write_timeout: Duration,
}

impl PaymentCoordinator {
    pub fn new(orders: Arc<dyn OrderRepository>, write_timeout: Duration) -> Self {
        Self {
            processors: HashMap::new(),
            orders,
            event_sender: None,
            write_timeout,
        }
    }

    pub fn with_processor(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processors.insert(processor.method(), processor);
        self
    }

    pub fn with_event_sender(mut self, event_sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(event_sender);
        self
    }

    pub fn supports(&self, method: PaymentMethod) -> bool {
        self.processors.contains_key(&method)
    }

    /// Runs the order's payment variant and writes the resulting payment
    /// sub-record. A provider error leaves the stored record untouched.
    #[instrument(skip(self, order, details), fields(order_id = %order.id, method = %order.payment.method()))]
    pub async fn process(
        &self,
        order: &Order,
        details: &PaymentDetails,
    ) -> Result<PaymentOutcome, PaymentError> {
        ensure_method(order, details)?;
        let method = details.method();
        let processor = self
            .processors
            .get(&method)
            .ok_or(PaymentError::UnsupportedMethod(method))?;

        let outcome = bounded(processor.deadline(), processor.process(order, details)).await?;

        let Some(record) = outcome.record(order.total) else {
            info!("Payment left pending; shopper did not complete the provider flow");
            return Ok(outcome);
        };
        let status = record.status;

        let write = tokio::time::timeout(
            self.write_timeout,
            self.orders.update_payment(order.id, &record),
        )
        .await
        .map_err(|_| ServiceError::Timeout(format!("payment write exceeded {:?}", self.write_timeout)))
        .and_then(|result| result);

        if let Err(e) = write {
            error!(
                details = ?record.details,
                "Provider reported {} but the payment record could not be written: {}",
                status,
                e
            );
            return Err(PaymentError::Repository(e));
        }

        if status != order.payment.status {
            if let Some(sender) = &self.event_sender {
                sender
                    .send_or_log(Event::PaymentStatusChanged {
                        order_id: order.id,
                        method,
                        old_status: order.payment.status,
                        new_status: status,
                    })
                    .await;
            }
        }

        match &outcome {
            PaymentOutcome::Failed { reason, .. } => warn!(%reason, "Payment declined"),
            _ => info!(%status, "Payment recorded"),
        }
        Ok(outcome)
    }

    /// Runs payment again for an existing, unpaid order. The order itself is
    /// reused, never duplicated.
    #[instrument(skip(self, details))]
    pub async fn retry_payment(
        &self,
        order_id: Uuid,
        details: &PaymentDetails,
    ) -> Result<(Order, PaymentOutcome), PaymentError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(PaymentError::OrderNotFound(order_id))?;

        if order.payment.status == PaymentStatus::Completed {
            return Err(PaymentError::AlreadyCompleted(order_id));
        }

        let outcome = self.process(&order, details).await?;
        Ok((order, outcome))
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::models::{BankAccount, DeliveryAddress, Order, OrderItem, PaymentStatus};

pub const SIGNATURE_HEADER: &str = "X-Storefront-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Storefront-Timestamp";

type HmacSha256 = Hmac<Sha256>;

/// Notification delivery errors. Never fail a checkout; callers log them.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid message: {0}")]
    Invalid(String),
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Snapshot of an order as shown in the confirmation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub currency: String,
    pub delivery: DeliveryAddress,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_account: Option<BankAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ussd_code: Option<String>,
    pub placed_at: DateTime<Utc>,
}

impl OrderConfirmation {
    pub fn from_order(order: &Order, currency: &str) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.delivery.full_name(),
            items: order.items.clone(),
            total: order.total,
            currency: currency.to_string(),
            delivery: order.delivery.clone(),
            payment_method: order.payment.method().to_string(),
            payment_status: order.payment.status,
            payment_reference: order.payment.reference().map(str::to_string),
            bank_account: order.payment.bank_account().cloned(),
            ussd_code: order.payment.ussd_code().map(str::to_string),
            placed_at: order.created_at,
        }
    }
}

/// Message from the storefront contact form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ContactMessage {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
    #[validate(length(min = 10, message = "Message must be at least 10 characters"))]
    pub message: String,
}

impl ContactMessage {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let contact = Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
            message: message.into().trim().to_string(),
        };
        contact
            .validate()
            .map_err(|e| NotificationError::Invalid(e.to_string()))?;
        Ok(contact)
    }
}

/// Outbound shopper and staff notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
        email: &str,
    ) -> Result<(), NotificationError>;

    async fn send_contact_message(&self, message: &ContactMessage)
        -> Result<(), NotificationError>;
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
        email: &str,
    ) -> Result<(), NotificationError> {
        info!(
            order_id = %confirmation.order_id,
            %email,
            total = %confirmation.total,
            payment_method = %confirmation.payment_method,
            "Order confirmation"
        );
        Ok(())
    }

    async fn send_contact_message(
        &self,
        message: &ContactMessage,
    ) -> Result<(), NotificationError> {
        info!(name = %message.name, email = %message.email, "Contact message received");
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WebhookPayload<'a> {
    OrderConfirmation {
        email: &'a str,
        order: &'a OrderConfirmation,
    },
    ContactMessage(&'a ContactMessage),
}

/// HMAC signature generator for webhook authentication
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Hex HMAC-SHA256 of `timestamp.body`
    pub fn sign_payload(&self, timestamp: &str, body: &str) -> Result<String, NotificationError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| NotificationError::Invalid(format!("unusable webhook secret: {}", e)))?;
        mac.update(format!("{}.{}", timestamp, body).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Posts notifications as JSON to a webhook (an email relay, say).
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    signature_generator: Option<Arc<SignatureGenerator>>,
    request_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Delivery(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            signature_generator: secret.map(|secret| Arc::new(SignatureGenerator::new(secret))),
            request_timeout: timeout,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Pause after failed attempt number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay
            .saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Longest one delivery can take: every attempt timing out plus the
    /// pauses between them.
    pub fn delivery_budget(&self) -> Duration {
        let pauses = (1..self.max_retries)
            .fold(Duration::ZERO, |total, attempt| total.saturating_add(self.backoff(attempt)));
        self.request_timeout
            .saturating_mul(self.max_retries)
            .saturating_add(pauses)
    }

    /// Send webhook with retry logic
    #[instrument(skip(self, payload))]
    async fn deliver(&self, payload: &WebhookPayload<'_>) -> Result<(), NotificationError> {
        let body = serde_json::to_string(payload)?;
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self
            .signature_generator
            .as_ref()
            .map(|gen| gen.sign_payload(&timestamp, &body))
            .transpose()?;

        let mut last_error = String::new();
        for attempt in 1..=self.max_retries {
            let mut request = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header(TIMESTAMP_HEADER, &timestamp)
                .body(body.clone());

            if let Some(ref sig) = signature {
                request = request.header(SIGNATURE_HEADER, sig);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!("Webhook delivered successfully to {}", self.url);
                    return Ok(());
                }
                Ok(response) => {
                    last_error = format!("status {}", response.status());
                    warn!(
                        "Webhook delivery failed with status: {} (attempt {}/{})",
                        response.status(),
                        attempt,
                        self.max_retries
                    );
                    if response.status().is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "Webhook delivery error: {} (attempt {}/{})",
                        e, attempt, self.max_retries
                    );
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        error!("Webhook delivery to {} failed: {}", self.url, last_error);
        Err(NotificationError::Delivery(last_error))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
        email: &str,
    ) -> Result<(), NotificationError> {
        self.deliver(&WebhookPayload::OrderConfirmation {
            email,
            order: confirmation,
        })
        .await
    }

    async fn send_contact_message(
        &self,
        message: &ContactMessage,
    ) -> Result<(), NotificationError> {
        self.deliver(&WebhookPayload::ContactMessage(message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_stable_hex() {
        let gen = SignatureGenerator::new("whsec_test".into());
        let a = gen.sign_payload("1700000000", "{\"a\":1}").unwrap();
        let b = gen.sign_payload("1700000000", "{\"a\":1}").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, gen.sign_payload("1700000001", "{\"a\":1}").unwrap());
    }

    #[test]
    fn delivery_budget_covers_every_attempt_and_pause() {
        let notifier = WebhookNotifier::new("http://localhost:9", None, Duration::from_secs(2))
            .unwrap()
            .with_retries(3, Duration::from_secs(1));
        // 3 attempts of 2s, pauses of 1s and 2s.
        assert_eq!(notifier.delivery_budget(), Duration::from_secs(9));

        let single = WebhookNotifier::new("http://localhost:9", None, Duration::from_secs(2))
            .unwrap()
            .with_retries(0, Duration::from_secs(1));
        assert_eq!(single.delivery_budget(), Duration::from_secs(2));
    }

    #[test]
    fn contact_message_is_validated() {
        assert!(ContactMessage::new("Ada", "ada@example.com", "Where is my parcel?").is_ok());
        assert!(matches!(
            ContactMessage::new("Ada", "not-an-email", "Where is my parcel?"),
            Err(NotificationError::Invalid(_))
        ));
        assert!(ContactMessage::new("  ", "ada@example.com", "Where is my parcel?").is_err());
        assert!(ContactMessage::new("Ada", "ada@example.com", "short").is_err());
    }
}

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::PaymentError;

/// A transaction as confirmed by the gateway's server-side API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransaction {
    pub reference: String,
    pub status: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub card_last4: Option<String>,
}

impl VerifiedTransaction {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    /// Why this transaction does not settle the expected payment, if it doesn't.
    pub fn mismatch(&self, reference: &str, amount_minor_units: i64, currency: &str) -> Option<String> {
        if !self.is_success() {
            Some(format!("gateway reports status '{}'", self.status))
        } else if self.reference != reference {
            Some(format!(
                "gateway reference {} does not match {}",
                self.reference, reference
            ))
        } else if self.amount_minor_units != amount_minor_units {
            Some(format!(
                "gateway amount {} does not match expected {}",
                self.amount_minor_units, amount_minor_units
            ))
        } else if !self.currency.eq_ignore_ascii_case(currency) {
            Some(format!(
                "gateway currency {} does not match {}",
                self.currency, currency
            ))
        } else {
            None
        }
    }
}

/// Server-side confirmation of a reference reported by the card widget.
#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    async fn verify(&self, reference: &str) -> Result<VerifiedTransaction, PaymentError>;
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    authorization: Option<Authorization>,
}

#[derive(Debug, Deserialize)]
struct Authorization {
    #[serde(default)]
    last4: Option<String>,
}

/// Paystack transaction verification client.
#[derive(Clone)]
pub struct PaystackClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl PaystackClient {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Provider(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }
}

#[async_trait]
impl TransactionVerifier for PaystackClient {
    #[instrument(skip(self))]
    async fn verify(&self, reference: &str) -> Result<VerifiedTransaction, PaymentError> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PaymentError::Provider(format!("verification timed out: {}", e))
                } else {
                    PaymentError::Provider(format!("verification request failed: {}", e))
                }
            })?;

        let http_status = response.status();
        if http_status.is_server_error() {
            warn!(%http_status, "Gateway verification unavailable");
            return Err(PaymentError::Provider(format!(
                "gateway returned {}",
                http_status
            )));
        }

        let body: VerifyResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(format!("malformed verification response: {}", e)))?;
        debug!(api_status = body.status, message = %body.message, "Verification response");

        match (body.status, body.data) {
            (true, Some(data)) => Ok(VerifiedTransaction {
                reference: data.reference,
                status: data.status,
                amount_minor_units: data.amount,
                currency: data.currency,
                card_last4: data.authorization.and_then(|auth| auth.last4),
            }),
            // Unknown references come back as status=false with a message.
            _ => Ok(VerifiedTransaction {
                reference: reference.to_string(),
                status: if body.message.is_empty() {
                    "unknown".to_string()
                } else {
                    body.message
                },
                amount_minor_units: 0,
                currency: String::new(),
                card_last4: None,
            }),
        }
    }
}

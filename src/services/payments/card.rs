use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::gateway::{GatewayCheckout, GatewayEvent, GatewayHandle};
use super::paystack::TransactionVerifier;
use super::{
    bounded, ensure_method, payment_reference, to_minor_units, PaymentDetails, PaymentError,
    PaymentOutcome, PaymentProcessor,
};
use crate::models::{Order, PaymentMethod, ProviderDetails};

/// Card payments through the gateway widget.
///
/// Success only counts for the reference the widget was opened with, and is
/// optionally confirmed with the gateway's API as well;
/// explicit failures are recorded as `Failed`; a closed or timed out widget
/// leaves the payment pending so the shopper can retry.
#[derive(Clone)]
pub struct CardPaymentProcessor {
    gateway: GatewayHandle,
    verifier: Option<Arc<dyn TransactionVerifier>>,
    public_key: String,
    currency: String,
    widget_timeout: Duration,
    network_timeout: Duration,
}

impl CardPaymentProcessor {
    pub fn new(
        gateway: GatewayHandle,
        public_key: impl Into<String>,
        currency: impl Into<String>,
        widget_timeout: Duration,
        network_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            verifier: None,
            public_key: public_key.into(),
            currency: currency.into(),
            widget_timeout,
            network_timeout,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn TransactionVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    fn checkout_request(&self, order: &Order, reference: &str) -> Result<GatewayCheckout, PaymentError> {
        Ok(GatewayCheckout {
            public_key: self.public_key.clone(),
            email: order.user_email.clone(),
            amount_minor_units: to_minor_units(order.total)?,
            currency: self.currency.clone(),
            reference: reference.to_string(),
            metadata: json!({
                "orderId": order.id,
                "customerName": order.delivery.full_name(),
                "phone": order.delivery.phone,
            }),
        })
    }

    async fn confirm(
        &self,
        request: &GatewayCheckout,
        reported_reference: String,
        last4: String,
    ) -> Result<PaymentOutcome, PaymentError> {
        if reported_reference != request.reference {
            let reason = format!(
                "gateway reported reference {} for checkout {}",
                reported_reference, request.reference
            );
            warn!(expected = %request.reference, %reason, "Card payment reported for another reference");
            return Ok(PaymentOutcome::Failed {
                details: ProviderDetails::Card {
                    reference: Some(request.reference.clone()),
                    card_last4: Some(last4),
                },
                reason,
            });
        }

        let Some(verifier) = &self.verifier else {
            return Ok(PaymentOutcome::Completed {
                details: ProviderDetails::Card {
                    reference: Some(reported_reference),
                    card_last4: Some(last4),
                },
            });
        };

        let verified = bounded(self.network_timeout, verifier.verify(&reported_reference)).await?;
        match verified.mismatch(
            &request.reference,
            request.amount_minor_units,
            &request.currency,
        ) {
            None => Ok(PaymentOutcome::Completed {
                details: ProviderDetails::Card {
                    reference: Some(verified.reference),
                    card_last4: verified.card_last4.or(Some(last4)),
                },
            }),
            Some(reason) => {
                warn!(reference = %reported_reference, %reason, "Card payment failed verification");
                Ok(PaymentOutcome::Failed {
                    details: ProviderDetails::Card {
                        reference: Some(reported_reference),
                        card_last4: Some(last4),
                    },
                    reason,
                })
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for CardPaymentProcessor {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn deadline(&self) -> Duration {
        // widget wait, gateway start-up and verification
        self.widget_timeout + self.network_timeout * 2
    }

    #[instrument(skip(self, order, details), fields(order_id = %order.id))]
    async fn process(
        &self,
        order: &Order,
        details: &PaymentDetails,
    ) -> Result<PaymentOutcome, PaymentError> {
        ensure_method(order, details)?;
        let PaymentDetails::Card(card) = details else {
            return Err(PaymentError::MethodMismatch {
                expected: PaymentMethod::Card,
                given: details.method(),
            });
        };

        let reference = payment_reference(order.id, Utc::now());
        let request = self.checkout_request(order, &reference)?;
        let gateway = bounded(self.network_timeout, self.gateway.get()).await?;

        info!(%reference, amount = request.amount_minor_units, "Opening card checkout");
        let event = match tokio::time::timeout(self.widget_timeout, gateway.checkout(request.clone())).await {
            Ok(event) => event?,
            Err(_) => {
                info!(%reference, "Card checkout timed out; treating as abandoned");
                return Ok(PaymentOutcome::Abandoned { reference });
            }
        };

        match event {
            GatewayEvent::Success {
                reference: reported,
            } => self.confirm(&request, reported, card.last4()).await,
            GatewayEvent::Failed { reason } => Ok(PaymentOutcome::Failed {
                details: ProviderDetails::Card {
                    reference: Some(reference),
                    card_last4: Some(card.last4()),
                },
                reason,
            }),
            GatewayEvent::Closed => {
                info!(%reference, "Card widget closed without payment");
                Ok(PaymentOutcome::Abandoned { reference })
            }
        }
    }
}

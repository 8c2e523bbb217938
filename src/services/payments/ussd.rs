use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, instrument};

use super::{ensure_method, PaymentDetails, PaymentError, PaymentOutcome, PaymentProcessor};
use crate::config::USSD_AMOUNT_PLACEHOLDER;
use crate::models::{Order, PaymentMethod, ProviderDetails};

/// Generates a USSD dial code carrying the order amount. Confirmation is
/// manual, as with bank transfers.
#[derive(Debug, Clone)]
pub struct UssdProcessor {
    code_template: String,
    deadline: Duration,
}

impl UssdProcessor {
    pub fn new(code_template: impl Into<String>, deadline: Duration) -> Self {
        Self {
            code_template: code_template.into(),
            deadline,
        }
    }

    /// `*737*000*{amount}#` with 2500.00 becomes `*737*000*2500#`.
    pub fn dial_code(&self, amount: Decimal) -> String {
        self.code_template
            .replace(USSD_AMOUNT_PLACEHOLDER, &amount.normalize().to_string())
    }
}

#[async_trait]
impl PaymentProcessor for UssdProcessor {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Ussd
    }

    fn deadline(&self) -> Duration {
        self.deadline
    }

    #[instrument(skip(self, order, details), fields(order_id = %order.id))]
    async fn process(
        &self,
        order: &Order,
        details: &PaymentDetails,
    ) -> Result<PaymentOutcome, PaymentError> {
        ensure_method(order, details)?;
        let code = self.dial_code(order.total);
        info!(%code, "Issued USSD payment code");
        Ok(PaymentOutcome::AwaitingConfirmation {
            details: ProviderDetails::Ussd { code: Some(code) },
        })
    }
}

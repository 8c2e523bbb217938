use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument};

use super::{ensure_method, PaymentDetails, PaymentError, PaymentOutcome, PaymentProcessor};
use crate::models::{BankAccount, Order, PaymentMethod, ProviderDetails};

/// Issues the store's bank account for an out-of-band transfer. The payment
/// stays pending until an admin confirms receipt.
#[derive(Debug, Clone)]
pub struct BankTransferProcessor {
    account: BankAccount,
    deadline: Duration,
}

impl BankTransferProcessor {
    pub fn new(account: BankAccount, deadline: Duration) -> Self {
        Self { account, deadline }
    }
}

#[async_trait]
impl PaymentProcessor for BankTransferProcessor {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::BankTransfer
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
        info!(bank = %self.account.bank_name, "Issuing bank transfer instructions");
        Ok(PaymentOutcome::AwaitingConfirmation {
            details: ProviderDetails::BankTransfer {
                account: Some(self.account.clone()),
            },
        })
    }
}

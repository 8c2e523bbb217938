use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment method selected at checkout.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum PaymentMethod {
    #[strum(to_string = "Card")]
    Card,
    #[strum(to_string = "Bank Transfer", serialize = "BankTransfer", serialize = "bank_transfer")]
    BankTransfer,
    #[strum(to_string = "USSD", serialize = "Ussd")]
    Ussd,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Static account the shopper pays into for bank transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

/// Method-specific payment fields. Only the variant of the selected method
/// can exist on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all_fields = "camelCase")]
pub enum ProviderDetails {
    Card {
        #[serde(default)]
        reference: Option<String>,
        #[serde(default)]
        card_last4: Option<String>,
    },
    BankTransfer {
        #[serde(default)]
        account: Option<BankAccount>,
    },
    Ussd {
        #[serde(default)]
        code: Option<String>,
    },
}

impl ProviderDetails {
    pub fn empty(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Card => Self::Card {
                reference: None,
                card_last4: None,
            },
            PaymentMethod::BankTransfer => Self::BankTransfer { account: None },
            PaymentMethod::Ussd => Self::Ussd { code: None },
        }
    }

    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::Card { .. } => PaymentMethod::Card,
            Self::BankTransfer { .. } => PaymentMethod::BankTransfer,
            Self::Ussd { .. } => PaymentMethod::Ussd,
        }
    }
}

/// Payment sub-record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub details: ProviderDetails,
}

impl PaymentRecord {
    /// Record written at order creation: pending, no provider fields yet.
    pub fn pending(method: PaymentMethod, amount: Decimal) -> Self {
        Self {
            amount,
            status: PaymentStatus::Pending,
            details: ProviderDetails::empty(method),
        }
    }

    pub fn method(&self) -> PaymentMethod {
        self.details.method()
    }

    pub fn reference(&self) -> Option<&str> {
        match &self.details {
            ProviderDetails::Card { reference, .. } => reference.as_deref(),
            _ => None,
        }
    }

    pub fn ussd_code(&self) -> Option<&str> {
        match &self.details {
            ProviderDetails::Ussd { code } => code.as_deref(),
            _ => None,
        }
    }

    pub fn bank_account(&self) -> Option<&BankAccount> {
        match &self.details {
            ProviderDetails::BankTransfer { account } => account.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn method_is_derived_from_details() {
        let record = PaymentRecord::pending(PaymentMethod::Ussd, dec!(2500));
        assert_eq!(record.method(), PaymentMethod::Ussd);
        assert_eq!(record.status, PaymentStatus::Pending);
        assert!(record.reference().is_none());
        assert!(record.bank_account().is_none());
    }

    #[test]
    fn details_serialize_with_method_tag() {
        let record = PaymentRecord {
            amount: dec!(120.50),
            status: PaymentStatus::Completed,
            details: ProviderDetails::Card {
                reference: Some("ORD-1".into()),
                card_last4: Some("4242".into()),
            },
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["details"]["method"], "Card");
        assert_eq!(value["details"]["reference"], "ORD-1");
        assert_eq!(value["details"]["cardLast4"], "4242");
        assert_eq!(value["status"], "completed");
        assert!(value["details"].get("account").is_none());

        let parsed: PaymentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn method_parses_display_names() {
        assert_eq!(
            PaymentMethod::from_str("Bank Transfer").unwrap(),
            PaymentMethod::BankTransfer
        );
        assert_eq!(PaymentMethod::from_str("ussd").unwrap(), PaymentMethod::Ussd);
        assert_eq!(PaymentMethod::BankTransfer.to_string(), "Bank Transfer");
        assert!(PaymentMethod::from_str("paypal").is_err());
    }
}

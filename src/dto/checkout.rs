use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::errors::FieldViolation;
use crate::models::{DeliveryAddress, PaymentMethod};
use crate::services::payments::{CardDetails, PaymentDetails};

static CARD_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{16}$").unwrap());
static CARD_EXPIRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(0[1-9]|1[0-2])/\d{2}$").unwrap());
static CARD_CVC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{3,4}$").unwrap());

/// Struct field name to form field name, in the order violations are reported.
const FORM_FIELDS: &[(&str, &str)] = &[
    ("email", "email"),
    ("first_name", "firstName"),
    ("last_name", "lastName"),
    ("address", "address"),
    ("city", "city"),
    ("postal_code", "postalCode"),
    ("phone", "phone"),
];

/// Checkout form as submitted by the shopper.
#[derive(Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutForm {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,

    #[validate(length(min = 2, message = "First name is required"))]
    pub first_name: String,

    #[validate(length(min = 2, message = "Last name is required"))]
    pub last_name: String,

    #[validate(length(min = 5, message = "Address is required"))]
    pub address: String,

    #[validate(length(min = 2, message = "City is required"))]
    pub city: String,

    #[validate(length(min = 3, message = "Postal code is required"))]
    pub postal_code: String,

    #[validate(length(min = 5, message = "Phone number is required"))]
    pub phone: String,

    pub payment_method: PaymentMethod,

    /// Card fields are only read when `payment_method` is `Card`.
    #[serde(default)]
    pub card_number: Option<String>,
    #[serde(default)]
    pub card_expiry: Option<String>,
    #[serde(default)]
    pub card_cvc: Option<String>,
}

impl std::fmt::Debug for CheckoutForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutForm")
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("city", &self.city)
            .field("payment_method", &self.payment_method)
            .finish_non_exhaustive()
    }
}

impl CheckoutForm {
    /// Copy with surrounding whitespace removed and spaces stripped from the
    /// card number.
    pub fn normalized(&self) -> Self {
        let trim = |value: &String| value.trim().to_string();
        let trim_opt = |value: &Option<String>| value.as_ref().map(|v| v.trim().to_string());
        Self {
            email: trim(&self.email),
            first_name: trim(&self.first_name),
            last_name: trim(&self.last_name),
            address: trim(&self.address),
            city: trim(&self.city),
            postal_code: trim(&self.postal_code),
            phone: trim(&self.phone),
            payment_method: self.payment_method,
            card_number: self
                .card_number
                .as_ref()
                .map(|n| n.chars().filter(|c| !c.is_whitespace()).collect()),
            card_expiry: trim_opt(&self.card_expiry),
            card_cvc: trim_opt(&self.card_cvc),
        }
    }

    /// Every violated field, in form order. Empty when the form is valid.
    pub fn violations(&self) -> Vec<FieldViolation> {
        let form = self.normalized();
        let mut violations = match form.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => field_violations(&errors),
        };
        if form.payment_method == PaymentMethod::Card {
            violations.extend(form.card_violations());
        }
        violations
    }

    fn card_violations(&self) -> Vec<FieldViolation> {
        let checks: [(&str, &Option<String>, &Lazy<Regex>, &str); 3] = [
            (
                "cardNumber",
                &self.card_number,
                &CARD_NUMBER,
                "Card number must be 16 digits",
            ),
            (
                "cardExpiry",
                &self.card_expiry,
                &CARD_EXPIRY,
                "Expiry date must be in MM/YY format",
            ),
            ("cardCvc", &self.card_cvc, &CARD_CVC, "CVC must be 3 or 4 digits"),
        ];

        checks
            .iter()
            .filter(|(_, value, pattern, _)| {
                value.as_deref().map_or(true, |v| !pattern.is_match(v))
            })
            .map(|(field, _, _, reason)| FieldViolation::new(*field, *reason))
            .collect()
    }

    pub fn delivery(&self) -> DeliveryAddress {
        let form = self.normalized();
        DeliveryAddress {
            first_name: form.first_name,
            last_name: form.last_name,
            address: form.address,
            city: form.city,
            postal_code: form.postal_code,
            phone: form.phone,
        }
    }

    /// Method-specific details handed to the payment coordinator. Only
    /// meaningful once [`CheckoutForm::violations`] is empty.
    pub fn payment_details(&self) -> PaymentDetails {
        match self.payment_method {
            PaymentMethod::Card => {
                let form = self.normalized();
                PaymentDetails::Card(CardDetails {
                    card_number: form.card_number.unwrap_or_default(),
                    expiry: form.card_expiry.unwrap_or_default(),
                    cvc: form.card_cvc.unwrap_or_default(),
                })
            }
            PaymentMethod::BankTransfer => PaymentDetails::BankTransfer,
            PaymentMethod::Ussd => PaymentDetails::Ussd,
        }
    }
}

fn field_violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let field_errors = errors.field_errors();
    FORM_FIELDS
        .iter()
        .filter_map(|(name, form_name)| {
            let first = field_errors.get(name)?.first()?;
            let reason = first
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| first.code.to_string());
            Some(FieldViolation::new(*form_name, reason))
        })
        .collect()
}

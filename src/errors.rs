use sea_orm::error::DbErr;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::models::PaymentMethod;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::StorageError(err.to_string())
    }
}

impl ServiceError {
    /// Whether repeating the same read could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_)
                | Self::StorageError(_)
                | Self::Timeout(_)
                | Self::ExternalServiceError(_)
        )
    }

    /// Message safe to show to an end user.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::StorageError(_) => "Storage unavailable".to_string(),
            Self::SerializationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::Timeout(_) => "The request timed out".to_string(),
            Self::ExternalServiceError(_) => "Upstream service unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

/// One failed field of a submitted form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures surfaced by `CheckoutService::submit_order`.
///
/// Variants raised after the order exists carry its id so the shopper or
/// support can reconcile the payment against the same order.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Invalid input: {}", join_violations(.0))]
    InvalidInput(Vec<FieldViolation>),

    #[error("You must be logged in to checkout")]
    Unauthenticated,

    #[error("Your cart is empty")]
    EmptyCart,

    #[error("Order creation failed: {0}")]
    OrderCreationFailed(#[source] ServiceError),

    #[error("Payment provider error for order {order_id} ({method}): {cause}")]
    PaymentProviderError {
        order_id: Uuid,
        method: PaymentMethod,
        cause: String,
    },

    #[error("Payment for order {order_id} was declined: {reason}")]
    PaymentFailed { order_id: Uuid, reason: String },

    #[error("Payment for order {order_id} was not completed")]
    PaymentIncomplete { order_id: Uuid },
}

impl CheckoutError {
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Self::PaymentProviderError { order_id, .. }
            | Self::PaymentFailed { order_id, .. }
            | Self::PaymentIncomplete { order_id } => Some(*order_id),
            _ => None,
        }
    }

    /// Whether the shopper can retry payment against the existing order.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PaymentProviderError { .. }
                | Self::PaymentFailed { .. }
                | Self::PaymentIncomplete { .. }
        )
    }

    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::InvalidInput(violations) => violations,
            _ => &[],
        }
    }

    /// Message for the checkout page. Provider causes stay in the logs; the
    /// order id is always shown once an order exists.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidInput(_) => "Please correct the highlighted fields".to_string(),
            Self::Unauthenticated => "Please log in to complete your order".to_string(),
            Self::EmptyCart => "Your cart is empty".to_string(),
            Self::OrderCreationFailed(_) => {
                "Failed to process your order. Please try again.".to_string()
            }
            Self::PaymentProviderError { order_id, .. } => format!(
                "We could not reach the payment provider. Your order {} was saved; please retry payment or contact support.",
                order_id
            ),
            Self::PaymentFailed { order_id, .. } => format!(
                "Your payment was declined. Your order {} was saved; please retry payment or contact support.",
                order_id
            ),
            Self::PaymentIncomplete { order_id } => format!(
                "Payment was not completed. Your order {} is awaiting payment.",
                order_id
            ),
        }
    }
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_lists_every_violation() {
        let err = CheckoutError::InvalidInput(vec![
            FieldViolation::new("firstName", "First name is required"),
            FieldViolation::new("cardCvc", "CVC is required"),
        ]);
        let message = err.to_string();
        assert!(message.contains("firstName: First name is required"));
        assert!(message.contains("cardCvc: CVC is required"));
        assert_eq!(err.violations().len(), 2);
        assert!(err.order_id().is_none());
    }

    #[test]
    fn payment_errors_carry_order_id() {
        let order_id = Uuid::new_v4();
        let err = CheckoutError::PaymentProviderError {
            order_id,
            method: PaymentMethod::Card,
            cause: "connection reset".into(),
        };
        assert_eq!(err.order_id(), Some(order_id));
        assert!(err.is_retryable());
        assert!(err.user_message().contains(&order_id.to_string()));
        assert!(!err.user_message().contains("connection reset"));
    }

    #[test]
    fn pre_order_errors_are_not_retryable_payments() {
        assert!(!CheckoutError::EmptyCart.is_retryable());
        assert!(!CheckoutError::Unauthenticated.is_retryable());
        assert!(
            !CheckoutError::OrderCreationFailed(ServiceError::StorageError("down".into()))
                .is_retryable()
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::StorageError("disk full at /var/lib".into()).response_message(),
            "Storage unavailable"
        );
        assert_eq!(
            ServiceError::NotFound("Order 42 not found".into()).response_message(),
            "Not found: Order 42 not found"
        );
    }

    #[test]
    fn transient_errors() {
        assert!(ServiceError::Timeout("get".into()).is_transient());
        assert!(!ServiceError::NotFound("x".into()).is_transient());
        assert!(!ServiceError::Forbidden("x".into()).is_transient());
    }
}

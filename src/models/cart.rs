use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::product::Product;

/// One line of the cart. The product is held by value so the cart survives
/// catalog reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: i32,
}

impl CartItem {
    /// `None` when price times quantity is not representable.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.product.price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Read view of the cart with derived totals.
///
/// `total` and `count` are computed from `items` every time a snapshot is
/// taken; they are never stored alongside the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub total: Decimal,
    pub count: i64,
}

impl CartSnapshot {
    /// Sum of the line subtotals, or `None` if it overflows.
    pub fn checked_total(items: &[CartItem]) -> Option<Decimal> {
        items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.subtotal()?))
    }

    /// The cart service only stores items whose [`CartSnapshot::checked_total`]
    /// exists, so the saturating sum here is exact for them.
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let total = items.iter().fold(Decimal::ZERO, |total, item| {
            total.saturating_add(item.product.price.saturating_mul(Decimal::from(item.quantity)))
        });
        let count = items.iter().map(|item| i64::from(item.quantity)).sum();
        Self {
            items,
            total,
            count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::CartItem;
use super::payment::PaymentRecord;

/// Fulfillment lifecycle of an order.
///
/// Admins may move an order between any two statuses; `Completed` and
/// `Cancelled` are terminal only in the sense that leaving them is logged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Stage shown to the shopper on the delivery tracker.
    pub fn tracking_stage(self) -> Option<TrackingStage> {
        match self {
            Self::Pending => Some(TrackingStage::OrderPlaced),
            Self::Processing => Some(TrackingStage::Processing),
            Self::Shipped => Some(TrackingStage::Shipped),
            Self::Completed => Some(TrackingStage::Delivered),
            Self::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingStage {
    #[strum(to_string = "Order Placed")]
    OrderPlaced,
    Processing,
    Shipped,
    Delivered,
}

impl TrackingStage {
    pub fn description(self) -> &'static str {
        match self {
            Self::OrderPlaced => "Your order has been received",
            Self::Processing => "Order is being prepared",
            Self::Shipped => "Your package is on its way",
            Self::Delivered => "Package has been delivered",
        }
    }
}

/// Line item frozen at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
}

impl OrderItem {
    /// `None` when price times quantity is not representable.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.price.checked_mul(Decimal::from(self.quantity))
    }

    /// Sum of the subtotals of `items`, or `None` if it overflows.
    pub fn total_of(items: &[OrderItem]) -> Option<Decimal> {
        items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.subtotal()?))
    }
}

impl From<&CartItem> for OrderItem {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product.id.clone(),
            name: item.product.name.clone(),
            price: item.product.price,
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub phone: String,
}

impl DeliveryAddress {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Order as written to the repository, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user_id: String,
    pub user_email: String,
    pub items: Vec<OrderItem>,
    pub delivery: DeliveryAddress,
    pub payment: PaymentRecord,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn with_id(self, id: Uuid) -> Order {
        Order {
            id,
            user_id: self.user_id,
            user_email: self.user_email,
            items: self.items,
            delivery: self.delivery,
            payment: self.payment,
            total: self.total,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// A persisted order.
///
/// `total` is the value computed at creation and is never recomputed from
/// `items` afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub user_email: String,
    pub items: Vec<OrderItem>,
    pub delivery: DeliveryAddress,
    pub payment: PaymentRecord,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|item| i64::from(item.quantity)).sum()
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog product. Owned by the catalog; the cart and orders keep copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: String,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            description: String::new(),
            image: String::new(),
            category: String::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

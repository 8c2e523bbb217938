/// Commerce services module - cart and checkout
pub mod cart_service;
pub mod checkout_service;

// Re-export services for convenience
pub use cart_service::{CartService, CartStorage, InMemoryCartStorage, JsonFileCartStorage};
pub use checkout_service::{CheckoutReceipt, CheckoutService};

//! Plain data model shared by the cart, checkout, payment and admin services.

pub mod cart;
pub mod order;
pub mod payment;
pub mod product;
pub mod user;

pub use cart::{CartItem, CartSnapshot};
pub use order::{DeliveryAddress, NewOrder, Order, OrderItem, OrderStatus, TrackingStage};
pub use payment::{BankAccount, PaymentMethod, PaymentRecord, PaymentStatus, ProviderDetails};
pub use product::Product;
pub use user::{Role, User};

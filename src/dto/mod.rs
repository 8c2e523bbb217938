pub mod checkout;

pub use checkout::CheckoutForm;

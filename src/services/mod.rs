// Catalog collaborator
pub mod catalog;

// Cart and checkout
pub mod commerce;

// Payment coordinator and method variants
pub mod payments;

// Order queries and the admin status machine
pub mod order_status;
pub mod orders;

//! Domain records shared across handlers.
pub mod cart;
pub mod catalog;
pub mod order;

pub use cart::{CartItem, CartLine, CartView};
pub use catalog::{Category, Product};
pub use order::{FulfillmentStatus, Order, OrderItem, OrderView, PaymentMethod};

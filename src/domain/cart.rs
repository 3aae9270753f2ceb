//! Cart records.
//!
//! A cart is the set of `cart_items` rows for one user; it comes into
//! existence with the first added item and is "cleared" by deleting its
//! rows, never the user.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_snapshot: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A cart row joined with its product, as returned by the API.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price_snapshot: Decimal,
    pub stock: i32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.price_snapshot * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
}

impl CartView {
    pub fn new(items: Vec<CartLine>) -> Self {
        let subtotal = items.iter().fold(Decimal::ZERO, |acc, line| acc + line.line_total());
        Self { items, subtotal }
    }
}

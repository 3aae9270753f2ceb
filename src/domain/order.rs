//! Order records and the fulfillment state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Paid in person when the order arrives.
    Cod,
    /// PayOS hosted checkout, confirmed asynchronously by webhook.
    Payos,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cod => "cod",
            Self::Payos => "payos",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// `pending -> processing -> shipped -> delivered`, with `cancelled`
    /// reachable from `pending` and `processing`. `delivered` and
    /// `cancelled` are terminal.
    pub fn can_transition(self, next: Self) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
        )
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub shipping_address: serde_json::Value,
    pub payment_method: String,
    pub payos_order_code: Option<i64>,
    pub payos_payment_link_id: Option<String>,
    pub payos_transaction_ref: Option<String>,
    pub payos_status: Option<String>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub fulfillment_status: String,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Always derived, never stored.
    pub fn final_total(&self) -> Decimal {
        (self.subtotal + self.shipping_fee + self.tax - self.discount).round_dp(2)
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// An order with its line items and the derived total, as returned by the
/// API.
#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub final_total: Decimal,
    pub items: Vec<OrderItem>,
}

impl OrderView {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        let final_total = order.final_total();
        Self { order, final_total, items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use FulfillmentStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Processing.can_transition(Shipped));
        assert!(Shipped.can_transition(Delivered));
    }

    #[test]
    fn test_cancellation_only_from_early_states() {
        use FulfillmentStatus::*;
        assert!(Pending.can_transition(Cancelled));
        assert!(Processing.can_transition(Cancelled));
        assert!(!Shipped.can_transition(Cancelled));
        assert!(!Delivered.can_transition(Cancelled));
    }

    #[test]
    fn test_terminal_states() {
        use FulfillmentStatus::*;
        for next in [Pending, Processing, Shipped, Delivered, Cancelled] {
            assert!(!Cancelled.can_transition(next));
            assert!(!Delivered.can_transition(next));
        }
    }

    #[test]
    fn test_no_backward_or_skip_transitions() {
        use FulfillmentStatus::*;
        assert!(!Processing.can_transition(Pending));
        assert!(!Pending.can_transition(Shipped));
        assert!(!Pending.can_transition(Delivered));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            FulfillmentStatus::Pending,
            FulfillmentStatus::Processing,
            FulfillmentStatus::Shipped,
            FulfillmentStatus::Delivered,
            FulfillmentStatus::Cancelled,
        ] {
            assert_eq!(FulfillmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FulfillmentStatus::parse("refunded"), None);
    }

    fn order_with_totals(subtotal: Decimal, shipping: Decimal, tax: Decimal, discount: Decimal) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            shipping_address: serde_json::json!({}),
            payment_method: "cod".into(),
            payos_order_code: None,
            payos_payment_link_id: None,
            payos_transaction_ref: None,
            payos_status: None,
            is_paid: false,
            paid_at: None,
            fulfillment_status: "pending".into(),
            subtotal,
            shipping_fee: shipping,
            tax,
            discount,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_final_total_is_derived() {
        let order = order_with_totals(
            Decimal::new(6000, 2),
            Decimal::ZERO,
            Decimal::new(480, 2),
            Decimal::ZERO,
        );
        assert_eq!(order.final_total(), Decimal::new(6480, 2));
    }

    #[test]
    fn test_final_total_subtracts_discount() {
        let order = order_with_totals(
            Decimal::new(3000, 2),
            Decimal::new(500, 2),
            Decimal::new(240, 2),
            Decimal::new(1000, 2),
        );
        assert_eq!(order.final_total(), Decimal::new(2740, 2));
    }
}

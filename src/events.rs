//! Order lifecycle events, published to NATS when configured.
//!
//! Publishing is strictly fire-and-forget: a missing client or a failed
//! publish never affects the request that raised the event.

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, user_id: Uuid, payment_method: String },
    Paid { order_id: Uuid, transaction_ref: Option<String> },
    Cancelled { order_id: Uuid },
}

impl OrderEvent {
    fn subject(&self) -> &'static str {
        match self {
            Self::Created { .. } => "orders.created",
            Self::Paid { .. } => "orders.paid",
            Self::Cancelled { .. } => "orders.cancelled",
        }
    }
}

#[derive(Clone)]
pub struct Publisher {
    client: Option<async_nats::Client>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").field("enabled", &self.client.is_some()).finish()
    }
}

impl Publisher {
    pub fn new(client: Option<async_nats::Client>) -> Self {
        Self { client }
    }

    pub fn disabled() -> Self {
        Self { client: None }
    }

    pub async fn publish(&self, event: OrderEvent) {
        let Some(client) = &self.client else { return };
        let payload = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%error, "failed to encode order event");
                return;
            }
        };
        if let Err(error) = client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(%error, subject = event.subject(), "failed to publish order event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_subjects() {
        let created = OrderEvent::Created {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            payment_method: "cod".into(),
        };
        assert_eq!(created.subject(), "orders.created");
        let paid = OrderEvent::Paid { order_id: Uuid::new_v4(), transaction_ref: None };
        assert_eq!(paid.subject(), "orders.paid");
    }

    #[test]
    fn test_event_serialization_tags_type() {
        let event = OrderEvent::Cancelled { order_id: Uuid::nil() };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "cancelled");
        assert_eq!(value["order_id"], Uuid::nil().to_string());
    }
}

//! Payment webhook reconciliation.
//!
//! The gateway retries on non-2xx, and conditions this service cannot
//! resolve (unknown order code, malformed payload) would retry forever, so
//! the handler acknowledges every delivery and routes failures to the log.
//! Re-delivery of a paid order is a no-op.

use axum::{extract::State, Json};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::order::{FulfillmentStatus, Order},
    error::ApiError,
    events::OrderEvent,
    payos::{self, WebhookPayload},
    response::ApiResponse,
    state::AppState,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ReconcileAction {
    MarkPaid { transaction_ref: Option<String>, gateway_status: String },
    Cancel { gateway_status: String },
    AlreadyProcessed,
}

pub(crate) fn decide(payload: &WebhookPayload, order_is_paid: bool) -> ReconcileAction {
    if order_is_paid {
        return ReconcileAction::AlreadyProcessed;
    }
    if payload.succeeded() {
        ReconcileAction::MarkPaid {
            transaction_ref: payload.data.reference.clone(),
            gateway_status: payload.code.clone(),
        }
    } else {
        ReconcileAction::Cancel { gateway_status: payload.code.clone() }
    }
}

/// Always acknowledges; the response does not depend on the processing
/// outcome.
pub async fn payos_webhook(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Json<ApiResponse<()>> {
    match process(&state, &raw).await {
        Ok(outcome) => tracing::info!(outcome, "webhook processed"),
        Err(error) => tracing::warn!(%error, "webhook dropped"),
    }
    Json(ApiResponse::message("received"))
}

async fn process(state: &AppState, raw: &Value) -> Result<&'static str, ApiError> {
    let payload: WebhookPayload = serde_json::from_value(raw.clone())
        .map_err(|e| ApiError::Validation(format!("unrecognized webhook payload: {e}")))?;

    if let Some(client) = &state.payos {
        let signature = payload
            .signature
            .as_deref()
            .ok_or_else(|| ApiError::Validation("webhook payload carried no signature".into()))?;
        let data = raw.get("data").cloned().unwrap_or(Value::Null);
        if !payos::verify_webhook_signature(&data, signature, client.checksum_key()) {
            return Err(ApiError::Validation("webhook signature mismatch".into()));
        }
    }

    let Some(order) =
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE payos_order_code = $1")
            .bind(payload.data.order_code)
            .fetch_optional(&state.db)
            .await?
    else {
        tracing::warn!(order_code = payload.data.order_code, "webhook for unknown order code");
        return Ok("unknown order code");
    };

    match decide(&payload, order.is_paid) {
        ReconcileAction::AlreadyProcessed => Ok("already paid"),
        ReconcileAction::MarkPaid { transaction_ref, gateway_status } => {
            sqlx::query(
                "UPDATE orders SET is_paid = TRUE, paid_at = NOW(), fulfillment_status = $2, \
                 payos_transaction_ref = $3, payos_status = $4, updated_at = NOW() WHERE id = $1",
            )
            .bind(order.id)
            .bind(FulfillmentStatus::Processing.as_str())
            .bind(&transaction_ref)
            .bind(&gateway_status)
            .execute(&state.db)
            .await?;
            decrement_order_stock(state, order.id).await?;
            state
                .events
                .publish(OrderEvent::Paid { order_id: order.id, transaction_ref })
                .await;
            Ok("order marked paid")
        }
        ReconcileAction::Cancel { gateway_status } => {
            sqlx::query(
                "UPDATE orders SET fulfillment_status = $2, payos_status = $3, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(order.id)
            .bind(FulfillmentStatus::Cancelled.as_str())
            .bind(&gateway_status)
            .execute(&state.db)
            .await?;
            state.events.publish(OrderEvent::Cancelled { order_id: order.id }).await;
            Ok("order cancelled")
        }
    }
}

/// The only stock-decrement point for gateway orders; stock was not
/// reserved at creation time.
async fn decrement_order_stock(state: &AppState, order_id: Uuid) -> Result<(), ApiError> {
    let items = sqlx::query_as::<_, (Uuid, i32)>(
        "SELECT product_id, quantity FROM order_items WHERE order_id = $1",
    )
    .bind(order_id)
    .fetch_all(&state.db)
    .await?;
    for (product_id, quantity) in items {
        if !super::try_decrement_stock(&state.db, product_id, quantity).await? {
            // Payment is already confirmed; an oversell can only be logged.
            tracing::warn!(%order_id, %product_id, quantity, "paid order exceeds remaining stock");
        }
    }
    Ok(())
}

//! Order orchestration: checkout, owner-facing listing, pricing constants.
//!
//! Stock is guarded by a conditional decrement (`stock = stock - q WHERE
//! stock >= q`) checked through `rows_affected`, so two concurrent
//! checkouts cannot both take the last unit. Cash-on-delivery decrements
//! at creation; gateway orders decrement only when the paid webhook
//! arrives.

pub mod webhook;

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::CurrentUser,
    domain::catalog::PRODUCT_ACTIVE,
    domain::order::{Order, OrderItem, OrderView, PaymentMethod},
    error::ApiError,
    events::OrderEvent,
    payos::{self, NewPaymentLink, PaymentItem},
    pricing::{compute_totals, OrderTotals},
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct RequestedItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 1, max = 30))]
    pub phone: String,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    #[validate(length(min = 1, max = 120))]
    pub country: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    /// Source the line items from the caller's cart instead of `items`.
    #[serde(default)]
    pub from_cart: bool,
    #[serde(default)]
    pub items: Vec<RequestedItem>,
    #[validate]
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResult {
    pub order: OrderView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ItemSource {
    Cart,
    Explicit,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub(crate) struct StockedProduct {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub stock: i32,
}

/// A validated line with its price and name snapshotted; once the order is
/// persisted these values never track the catalog again.
#[derive(Clone, Debug)]
pub(crate) struct NewLineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

pub(crate) fn assemble_line_items(
    requested: &[(Uuid, i32)],
    products: &[StockedProduct],
    source: ItemSource,
) -> Result<Vec<NewLineItem>, ApiError> {
    if requested.is_empty() {
        return Err(match source {
            ItemSource::Cart => ApiError::EmptyCart,
            ItemSource::Explicit => {
                ApiError::Validation("order must contain at least one item".into())
            }
        });
    }
    let mut lines = Vec::with_capacity(requested.len());
    for (product_id, quantity) in requested {
        if *quantity < 1 {
            return Err(ApiError::Validation("quantity must be at least 1".into()));
        }
        let Some(product) = products.iter().find(|p| p.id == *product_id) else {
            // A cart row pointing at a vanished product voids the cart.
            return Err(match source {
                ItemSource::Cart => ApiError::EmptyCart,
                ItemSource::Explicit => ApiError::NotFound("product"),
            });
        };
        if *quantity > product.stock {
            return Err(ApiError::InsufficientStock {
                name: product.name.clone(),
                available: product.stock,
            });
        }
        lines.push(NewLineItem {
            product_id: product.id,
            name: product.name.clone(),
            quantity: *quantity,
            unit_price: product.price,
        });
    }
    Ok(lines)
}

pub async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResult>>), ApiError> {
    request.validate().map_err(|e| ApiError::Validation(e.to_string()))?;

    // Fail before any write when the gateway is requested but absent.
    if request.payment_method == PaymentMethod::Payos && state.payos.is_none() {
        return Err(ApiError::PaymentUnavailable);
    }

    let (requested, source) = if request.from_cart {
        let rows: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user.id)
        .fetch_all(&state.db)
        .await?;
        (rows, ItemSource::Cart)
    } else {
        let pairs = request.items.iter().map(|i| (i.product_id, i.quantity)).collect();
        (pairs, ItemSource::Explicit)
    };

    let ids: Vec<Uuid> = requested.iter().map(|(id, _)| *id).collect();
    let products = sqlx::query_as::<_, StockedProduct>(
        "SELECT id, name, price, stock FROM products WHERE id = ANY($1) AND status = $2",
    )
    .bind(&ids)
    .bind(PRODUCT_ACTIVE)
    .fetch_all(&state.db)
    .await?;

    let lines = assemble_line_items(&requested, &products, source)?;
    let priced: Vec<(Decimal, i32)> = lines.iter().map(|l| (l.unit_price, l.quantity)).collect();
    let totals = compute_totals(&priced, &state.config.pricing);

    let order = insert_order(&state, &user, &request, &lines, &totals).await?;

    match request.payment_method {
        PaymentMethod::Cod => finalize_cod(&state, &user, order, &lines, request.from_cart).await,
        PaymentMethod::Payos => finalize_payos(&state, &user, order, &lines, &totals).await,
    }
}

async fn insert_order(
    state: &AppState,
    user: &CurrentUser,
    request: &CreateOrderRequest,
    lines: &[NewLineItem],
    totals: &OrderTotals,
) -> Result<Order, ApiError> {
    let address =
        serde_json::to_value(&request.shipping_address).map_err(|e| ApiError::Internal(e.into()))?;
    let mut tx = state.db.begin().await?;
    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, user_id, shipping_address, payment_method, subtotal, shipping_fee, tax, discount, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 0, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user.id)
    .bind(&address)
    .bind(request.payment_method.as_str())
    .bind(totals.subtotal)
    .bind(totals.shipping_fee)
    .bind(totals.tax)
    .fetch_one(&mut *tx)
    .await?;
    for line in lines {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, name, quantity, unit_price) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.name)
        .bind(line.quantity)
        .bind(line.unit_price)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(order)
}

async fn finalize_cod(
    state: &AppState,
    user: &CurrentUser,
    order: Order,
    lines: &[NewLineItem],
    from_cart: bool,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResult>>), ApiError> {
    let mut decremented: Vec<&NewLineItem> = Vec::new();
    for line in lines {
        if try_decrement_stock(&state.db, line.product_id, line.quantity).await? {
            decremented.push(line);
            continue;
        }
        // Lost the race since validation: undo what we took and abort.
        for done in &decremented {
            restore_stock(&state.db, done.product_id, done.quantity).await;
        }
        discard_order(&state.db, order.id).await;
        let (name, available) = current_stock(&state.db, line.product_id)
            .await?
            .unwrap_or_else(|| (line.name.clone(), 0));
        return Err(ApiError::InsufficientStock { name, available });
    }

    if from_cart {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user.id)
            .execute(&state.db)
            .await?;
    }

    state
        .events
        .publish(OrderEvent::Created {
            order_id: order.id,
            user_id: user.id,
            payment_method: order.payment_method.clone(),
        })
        .await;

    let view = load_view(&state.db, order).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CheckoutResult { order: view, checkout_url: None })),
    ))
}

async fn finalize_payos(
    state: &AppState,
    user: &CurrentUser,
    order: Order,
    lines: &[NewLineItem],
    totals: &OrderTotals,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResult>>), ApiError> {
    let Some(client) = &state.payos else {
        // Checked before the order was created; kept as a guard.
        discard_order(&state.db, order.id).await;
        return Err(ApiError::PaymentUnavailable);
    };

    let order_code = payos::order_code_from_millis(Utc::now().timestamp_millis());
    let link = match build_payment_link(
        &state.config.frontend_url,
        order_code,
        lines,
        totals,
        state.config.usd_to_vnd_rate,
    ) {
        Ok(link) => link,
        Err(err) => {
            discard_order(&state.db, order.id).await;
            return Err(err);
        }
    };

    match client.create_payment_link(&link).await {
        Ok(data) => {
            let order = sqlx::query_as::<_, Order>(
                "UPDATE orders SET payos_order_code = $2, payos_payment_link_id = $3, \
                 payos_status = $4, updated_at = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(order.id)
            .bind(order_code)
            .bind(&data.payment_link_id)
            .bind("pending")
            .fetch_one(&state.db)
            .await?;
            state
                .events
                .publish(OrderEvent::Created {
                    order_id: order.id,
                    user_id: user.id,
                    payment_method: order.payment_method.clone(),
                })
                .await;
            let view = load_view(&state.db, order).await?;
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::ok(CheckoutResult {
                    order: view,
                    checkout_url: Some(data.checkout_url),
                })),
            ))
        }
        Err(error) => {
            tracing::warn!(%error, order_id = %order.id, "payment link creation failed, rolling back order");
            discard_order(&state.db, order.id).await;
            Err(ApiError::PaymentLinkCreation(error.to_string()))
        }
    }
}

pub(crate) fn build_payment_link(
    frontend_url: &str,
    order_code: i64,
    lines: &[NewLineItem],
    totals: &OrderTotals,
    rate: Decimal,
) -> Result<NewPaymentLink, ApiError> {
    let amount_vnd = payos::to_vnd(totals.final_total, rate)
        .ok_or_else(|| ApiError::PaymentLinkCreation("order total out of range".into()))?;
    let items = lines
        .iter()
        .map(|line| {
            Ok(PaymentItem {
                name: payos::truncate_chars(&line.name, payos::DESCRIPTION_MAX_CHARS),
                quantity: line.quantity,
                price: payos::to_vnd(line.unit_price, rate).ok_or_else(|| {
                    ApiError::PaymentLinkCreation("item price out of range".into())
                })?,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;
    Ok(NewPaymentLink {
        order_code,
        amount_vnd,
        description: payos::truncate_chars(
            &format!("Order {order_code}"),
            payos::DESCRIPTION_MAX_CHARS,
        ),
        items,
        return_url: format!("{frontend_url}/checkout/success"),
        cancel_url: format!("{frontend_url}/checkout/cancel"),
    })
}

/// Conditional decrement; `false` means the stock was insufficient and
/// nothing changed.
pub(crate) async fn try_decrement_stock(
    db: &sqlx::PgPool,
    product_id: Uuid,
    quantity: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn restore_stock(db: &sqlx::PgPool, product_id: Uuid, quantity: i32) {
    if let Err(error) = sqlx::query(
        "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(product_id)
    .bind(quantity)
    .execute(db)
    .await
    {
        tracing::warn!(%error, %product_id, "failed to restore stock after aborted checkout");
    }
}

async fn discard_order(db: &sqlx::PgPool, order_id: Uuid) {
    if let Err(error) = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(order_id)
        .execute(db)
        .await
    {
        tracing::warn!(%error, %order_id, "failed to discard aborted order");
    }
}

async fn current_stock(
    db: &sqlx::PgPool,
    product_id: Uuid,
) -> Result<Option<(String, i32)>, sqlx::Error> {
    sqlx::query_as::<_, (String, i32)>("SELECT name, stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(db)
        .await
}

pub(crate) async fn load_view(db: &sqlx::PgPool, order: Order) -> Result<OrderView, ApiError> {
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order.id)
        .fetch_all(db)
        .await?;
    Ok(OrderView::new(order, items))
}

pub async fn list_my_orders(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<OrderView>>>, ApiError> {
    let orders =
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user.id)
            .fetch_all(&state.db)
            .await?;
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ANY($1)")
        .bind(&ids)
        .fetch_all(&state.db)
        .await?;
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }
    let views = orders
        .into_iter()
        .map(|order| {
            let items = by_order.remove(&order.id).unwrap_or_default();
            OrderView::new(order, items)
        })
        .collect();
    Ok(Json(ApiResponse::ok(views)))
}

pub async fn get_my_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderView>>, ApiError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    Ok(Json(ApiResponse::ok(load_view(&state.db, order).await?)))
}

#[derive(Debug, Serialize)]
pub struct ShippingConfigView {
    pub free_shipping_threshold: Decimal,
    pub flat_shipping_fee: Decimal,
    pub tax_rate: Decimal,
}

pub async fn shipping_config(
    State(state): State<AppState>,
) -> Json<ApiResponse<ShippingConfigView>> {
    let pricing = &state.config.pricing;
    Json(ApiResponse::ok(ShippingConfigView {
        free_shipping_threshold: pricing.free_shipping_threshold,
        flat_shipping_fee: pricing.flat_shipping_fee,
        tax_rate: pricing.tax_rate,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, price: Decimal, stock: i32) -> StockedProduct {
        StockedProduct { id: Uuid::new_v4(), name: name.into(), price, stock }
    }

    #[test]
    fn test_empty_cart_fails() {
        let result = assemble_line_items(&[], &[], ItemSource::Cart);
        assert!(matches!(result, Err(ApiError::EmptyCart)));
    }

    #[test]
    fn test_empty_explicit_list_is_validation_error() {
        let result = assemble_line_items(&[], &[], ItemSource::Explicit);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_vanished_product_voids_cart() {
        let result = assemble_line_items(&[(Uuid::new_v4(), 1)], &[], ItemSource::Cart);
        assert!(matches!(result, Err(ApiError::EmptyCart)));
    }

    #[test]
    fn test_vanished_product_is_not_found_for_explicit_items() {
        let result = assemble_line_items(&[(Uuid::new_v4(), 1)], &[], ItemSource::Explicit);
        assert!(matches!(result, Err(ApiError::NotFound("product"))));
    }

    #[test]
    fn test_insufficient_stock_carries_name_and_available() {
        let p = product("Widget", Decimal::new(2000, 2), 3);
        let result = assemble_line_items(&[(p.id, 5)], &[p], ItemSource::Cart);
        match result {
            Err(ApiError::InsufficientStock { name, available }) => {
                assert_eq!(name, "Widget");
                assert_eq!(available, 3);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
    }

    #[test]
    fn test_stock_boundary_is_inclusive() {
        let p = product("Widget", Decimal::new(2000, 2), 3);
        let lines = assemble_line_items(&[(p.id, 3)], &[p], ItemSource::Cart).unwrap();
        assert_eq!(lines[0].quantity, 3);
    }

    #[test]
    fn test_snapshot_captures_price_and_name() {
        let p = product("Widget", Decimal::new(1999, 2), 10);
        let id = p.id;
        let lines = assemble_line_items(&[(id, 2)], &[p], ItemSource::Explicit).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].product_id, id);
        assert_eq!(lines[0].name, "Widget");
        assert_eq!(lines[0].unit_price, Decimal::new(1999, 2));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let p = product("Widget", Decimal::new(1000, 2), 10);
        let result = assemble_line_items(&[(p.id, 0)], &[p], ItemSource::Explicit);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_payment_link_converts_and_truncates() {
        let lines = vec![NewLineItem {
            product_id: Uuid::new_v4(),
            name: "An unreasonably long product name that will not fit".into(),
            quantity: 3,
            unit_price: Decimal::new(2000, 2),
        }];
        let totals = OrderTotals {
            subtotal: Decimal::new(6000, 2),
            shipping_fee: Decimal::ZERO,
            tax: Decimal::new(480, 2),
            final_total: Decimal::new(6480, 2),
        };
        let link = build_payment_link(
            "https://shop.example.com",
            600_123,
            &lines,
            &totals,
            Decimal::new(25000, 0),
        )
        .unwrap();
        assert_eq!(link.amount_vnd, 1_620_000);
        assert_eq!(link.items[0].price, 500_000);
        assert_eq!(link.items[0].name.chars().count(), payos::DESCRIPTION_MAX_CHARS);
        assert_eq!(link.return_url, "https://shop.example.com/checkout/success");
        assert_eq!(link.cancel_url, "https://shop.example.com/checkout/cancel");
        assert!(link.description.chars().count() <= payos::DESCRIPTION_MAX_CHARS);
    }
}

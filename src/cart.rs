//! Cart handlers.
//!
//! The cart is lazily materialized: reading an empty cart is just an empty
//! row set, adding the first item creates it. Prices are snapshotted at
//! add time; stock is enforced at checkout, not here.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    domain::cart::{CartItem, CartLine, CartView},
    domain::catalog::{Product, PRODUCT_ACTIVE},
    error::ApiError,
    response::ApiResponse,
    state::AppState,
};

pub async fn get_cart(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<CartView>>, ApiError> {
    let items = sqlx::query_as::<_, CartLine>(
        "SELECT ci.product_id, p.name, ci.quantity, ci.price_snapshot, p.stock \
         FROM cart_items ci JOIN products p ON p.id = ci.product_id \
         WHERE ci.user_id = $1 ORDER BY ci.created_at",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::ok(CartView::new(items))))
}

#[derive(Debug, Deserialize)]
pub struct AddItemPayload {
    pub product_id: Uuid,
    pub quantity: i32,
}

pub async fn add_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<AddItemPayload>,
) -> Result<(StatusCode, Json<ApiResponse<CartItem>>), ApiError> {
    if payload.quantity < 1 {
        return Err(ApiError::Validation("quantity must be at least 1".into()));
    }
    let product = sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE id = $1 AND status = $2",
    )
    .bind(payload.product_id)
    .bind(PRODUCT_ACTIVE)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("product"))?;

    let item = sqlx::query_as::<_, CartItem>(
        "INSERT INTO cart_items (id, user_id, product_id, quantity, price_snapshot, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW()) \
         ON CONFLICT (user_id, product_id) DO UPDATE \
         SET quantity = cart_items.quantity + EXCLUDED.quantity, \
             price_snapshot = EXCLUDED.price_snapshot \
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user.id)
    .bind(product.id)
    .bind(payload.quantity)
    .bind(product.price)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(item))))
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemPayload {
    pub quantity: i32,
}

pub async fn update_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateItemPayload>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if payload.quantity < 0 {
        return Err(ApiError::Validation("quantity must not be negative".into()));
    }
    if payload.quantity == 0 {
        return remove(&state, user.id, product_id).await;
    }
    let result = sqlx::query(
        "UPDATE cart_items SET quantity = $3 WHERE user_id = $1 AND product_id = $2",
    )
    .bind(user.id)
    .bind(product_id)
    .bind(payload.quantity)
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("cart item"));
    }
    Ok(Json(ApiResponse::message("cart updated")))
}

pub async fn remove_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    remove(&state, user.id, product_id).await
}

async fn remove(
    state: &AppState,
    user_id: Uuid,
    product_id: Uuid,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("cart item"));
    }
    Ok(Json(ApiResponse::message("item removed")))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;
    Ok(Json(ApiResponse::message("cart cleared")))
}

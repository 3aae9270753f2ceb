//! Catalog handlers: public listing/fetch, admin mutation.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AdminUser,
    domain::catalog::{Category, Product, PRODUCT_ACTIVE, PRODUCT_DELETED},
    error::ApiError,
    response::{ApiResponse, PaginatedResponse},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
}

fn push_product_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &ListParams) {
    builder.push(" WHERE status = ").push_bind(PRODUCT_ACTIVE);
    if let Some(category) = params.category {
        builder.push(" AND category_id = ").push_bind(category);
    }
    if let Some(search) = &params.search {
        builder.push(" AND name ILIKE ").push_bind(format!("%{search}%"));
    }
}

pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<PaginatedResponse<Product>>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

    let mut query = QueryBuilder::new("SELECT * FROM products");
    push_product_filters(&mut query, &params);
    query
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind(((page - 1) * per_page) as i64);
    let products = query.build_query_as::<Product>().fetch_all(&state.db).await?;

    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM products");
    push_product_filters(&mut count, &params);
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;

    Ok(Json(ApiResponse::ok(PaginatedResponse { data: products, total, page, per_page })))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND status <> $2")
        .bind(id)
        .bind(PRODUCT_DELETED)
        .fetch_optional(&state.db)
        .await?
        .map(|product| Json(ApiResponse::ok(product)))
        .ok_or(ApiError::NotFound("product"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub stock: Option<i32>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ProductPayload {
    fn check(&self) -> Result<(), ApiError> {
        self.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
        if self.price < Decimal::ZERO {
            return Err(ApiError::Validation("price must not be negative".into()));
        }
        if self.stock.is_some_and(|stock| stock < 0) {
            return Err(ApiError::Validation("stock must not be negative".into()));
        }
        Ok(())
    }
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<ProductPayload>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), ApiError> {
    payload.check()?;
    let sku = format!("SKU-{:08}", rand::random::<u32>());
    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, sku, name, description, price, category_id, stock, status, images, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&sku)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.price)
    .bind(payload.category_id)
    .bind(payload.stock.unwrap_or(0))
    .bind(PRODUCT_ACTIVE)
    .bind(&payload.images)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(product))))
}

pub async fn update_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductPayload>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    payload.check()?;
    let product = sqlx::query_as::<_, Product>(
        "UPDATE products SET name = $2, description = $3, price = $4, category_id = $5, \
         stock = COALESCE($6, stock), images = $7, updated_at = NOW() \
         WHERE id = $1 AND status <> $8 RETURNING *",
    )
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.price)
    .bind(payload.category_id)
    .bind(payload.stock)
    .bind(&payload.images)
    .bind(PRODUCT_DELETED)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("product"))?;
    Ok(Json(ApiResponse::ok(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let result = sqlx::query("UPDATE products SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(PRODUCT_DELETED)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("product"));
    }
    Ok(Json(ApiResponse::message("product deleted")))
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Category>>>, ApiError> {
    let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(ApiResponse::ok(categories)))
}

pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .map(|category| Json(ApiResponse::ok(category)))
        .ok_or(ApiError::NotFound("category"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryPayload {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
}

pub async fn create_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Json(payload): Json<CategoryPayload>,
) -> Result<(StatusCode, Json<ApiResponse<Category>>), ApiError> {
    payload.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
    let slug = payload.name.to_lowercase().replace(' ', "-");
    let category = sqlx::query_as::<_, Category>(
        "INSERT INTO categories (id, name, slug, description, parent_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&payload.name)
    .bind(&slug)
    .bind(&payload.description)
    .bind(payload.parent_id)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(category))))
}

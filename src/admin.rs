//! Admin order management: filtered listing with stats, status mutation,
//! deletion, revenue aggregation.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    domain::order::{FulfillmentStatus, Order, OrderView},
    error::ApiError,
    orders::load_view,
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct AdminOrderFilter {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub is_paid: Option<bool>,
    pub min_total: Option<Decimal>,
    pub max_total: Option<Decimal>,
    /// Matched against the owner email and the order id.
    pub q: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct AdminOrderRow {
    #[sqlx(flatten)]
    order: Order,
    owner_email: String,
}

#[derive(Debug, Serialize)]
pub struct AdminOrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub owner_email: String,
    pub final_total: Decimal,
}

/// Revenue figures cover only the matching PAID orders; counts cover all
/// matches.
#[derive(Debug, Serialize)]
pub struct OrderStats {
    pub total_orders: i64,
    pub paid_orders: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AdminOrderList {
    pub orders: Vec<AdminOrderSummary>,
    pub page: u32,
    pub per_page: u32,
    pub stats: OrderStats,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &AdminOrderFilter) {
    builder.push(" WHERE TRUE");
    if let Some(from) = filter.from {
        builder.push(" AND o.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND o.created_at <= ").push_bind(to);
    }
    if let Some(status) = &filter.status {
        builder.push(" AND o.fulfillment_status = ").push_bind(status.clone());
    }
    if let Some(is_paid) = filter.is_paid {
        builder.push(" AND o.is_paid = ").push_bind(is_paid);
    }
    if let Some(min) = filter.min_total {
        builder
            .push(" AND (o.subtotal + o.shipping_fee + o.tax - o.discount) >= ")
            .push_bind(min);
    }
    if let Some(max) = filter.max_total {
        builder
            .push(" AND (o.subtotal + o.shipping_fee + o.tax - o.discount) <= ")
            .push_bind(max);
    }
    if let Some(q) = &filter.q {
        let pattern = format!("%{q}%");
        builder
            .push(" AND (u.email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR o.id::text ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

pub async fn list_orders(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(filter): Query<AdminOrderFilter>,
) -> Result<Json<ApiResponse<AdminOrderList>>, ApiError> {
    let page = filter.page.unwrap_or(1).max(1);
    let per_page = filter.per_page.unwrap_or(20).clamp(1, 100);

    if let Some(status) = &filter.status {
        if FulfillmentStatus::parse(status).is_none() {
            return Err(ApiError::Validation(format!("unknown status {status:?}")));
        }
    }

    let mut query = QueryBuilder::new(
        "SELECT o.*, u.email AS owner_email FROM orders o JOIN users u ON u.id = o.user_id",
    );
    push_filters(&mut query, &filter);
    query
        .push(" ORDER BY o.created_at DESC LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind(((page - 1) * per_page) as i64);
    let rows = query.build_query_as::<AdminOrderRow>().fetch_all(&state.db).await?;

    let mut stats_query = QueryBuilder::new(
        "SELECT COUNT(*) AS total_orders, \
         COUNT(*) FILTER (WHERE o.is_paid) AS paid_orders, \
         COALESCE(SUM(o.subtotal + o.shipping_fee + o.tax - o.discount) FILTER (WHERE o.is_paid), 0) AS revenue \
         FROM orders o JOIN users u ON u.id = o.user_id",
    );
    push_filters(&mut stats_query, &filter);
    let (total_orders, paid_orders, revenue): (i64, i64, Decimal) =
        stats_query.build_query_as().fetch_one(&state.db).await?;

    let orders = rows
        .into_iter()
        .map(|row| {
            let final_total = row.order.final_total();
            AdminOrderSummary { order: row.order, owner_email: row.owner_email, final_total }
        })
        .collect();

    Ok(Json(ApiResponse::ok(AdminOrderList {
        orders,
        page,
        per_page,
        stats: OrderStats { total_orders, paid_orders, revenue },
    })))
}

#[derive(Debug, Serialize)]
pub struct AdminOrderDetail {
    #[serde(flatten)]
    pub order: OrderView,
    pub owner_email: String,
}

pub async fn get_order(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AdminOrderDetail>>, ApiError> {
    let row = sqlx::query_as::<_, AdminOrderRow>(
        "SELECT o.*, u.email AS owner_email FROM orders o JOIN users u ON u.id = o.user_id \
         WHERE o.id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("order"))?;
    let view = load_view(&state.db, row.order).await?;
    Ok(Json(ApiResponse::ok(AdminOrderDetail { order: view, owner_email: row.owner_email })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusPayload {
    pub status: Option<String>,
    pub is_paid: Option<bool>,
}

fn validate_status_change(current: &str, requested: &str) -> Result<FulfillmentStatus, ApiError> {
    let current_status = FulfillmentStatus::parse(current).unwrap_or_default();
    let next = FulfillmentStatus::parse(requested)
        .ok_or_else(|| ApiError::Validation(format!("unknown status {requested:?}")))?;
    if next != current_status && !current_status.can_transition(next) {
        return Err(ApiError::InvalidTransition {
            from: current_status.as_str().into(),
            to: next.as_str().into(),
        });
    }
    Ok(next)
}

pub async fn update_status(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusPayload>,
) -> Result<Json<ApiResponse<OrderView>>, ApiError> {
    if payload.status.is_none() && payload.is_paid.is_none() {
        return Err(ApiError::Validation("nothing to update".into()));
    }

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("order"))?;

    let next_status = payload
        .status
        .as_deref()
        .map(|requested| validate_status_change(&order.fulfillment_status, requested))
        .transpose()?;

    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET \
         fulfillment_status = COALESCE($2, fulfillment_status), \
         is_paid = COALESCE($3, is_paid), \
         paid_at = CASE \
             WHEN $3 IS TRUE AND NOT is_paid THEN NOW() \
             WHEN $3 IS FALSE THEN NULL \
             ELSE paid_at END, \
         updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(next_status.map(FulfillmentStatus::as_str))
    .bind(payload.is_paid)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::ok(load_view(&state.db, updated).await?)))
}

pub async fn delete_order(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&state.db).await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("order"));
    }
    Ok(Json(ApiResponse::message("order deleted")))
}

#[derive(Debug, Deserialize)]
pub struct RevenueParams {
    pub days: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct RevenuePoint {
    pub day: DateTime<Utc>,
    pub orders: i64,
    pub revenue: Decimal,
}

pub async fn revenue(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<RevenueParams>,
) -> Result<Json<ApiResponse<Vec<RevenuePoint>>>, ApiError> {
    let days = params.days.unwrap_or(7).clamp(1, 365);
    let rows: Vec<(DateTime<Utc>, i64, Decimal)> = sqlx::query_as(
        "SELECT date_trunc('day', created_at) AS day, COUNT(*) AS orders, \
         SUM(subtotal + shipping_fee + tax - discount) AS revenue \
         FROM orders WHERE is_paid AND created_at >= NOW() - make_interval(days => $1) \
         GROUP BY day ORDER BY day",
    )
    .bind(days)
    .fetch_all(&state.db)
    .await?;
    let points = rows
        .into_iter()
        .map(|(day, orders, revenue)| RevenuePoint { day, orders, revenue })
        .collect();
    Ok(Json(ApiResponse::ok(points)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filters_is_bare_where() {
        let filter = AdminOrderFilter {
            page: None,
            per_page: None,
            from: None,
            to: None,
            status: None,
            is_paid: None,
            min_total: None,
            max_total: None,
            q: None,
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM orders o");
        push_filters(&mut builder, &filter);
        assert_eq!(builder.into_sql(), "SELECT 1 FROM orders o WHERE TRUE");
    }

    #[test]
    fn test_filters_compose() {
        let filter = AdminOrderFilter {
            page: None,
            per_page: None,
            from: Some(Utc::now()),
            to: None,
            status: Some("pending".into()),
            is_paid: Some(true),
            min_total: Some(Decimal::new(1000, 2)),
            max_total: None,
            q: Some("alice".into()),
        };
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM orders o");
        push_filters(&mut builder, &filter);
        let sql = builder.into_sql();
        assert!(sql.contains("o.created_at >= "));
        assert!(sql.contains("o.fulfillment_status = "));
        assert!(sql.contains("o.is_paid = "));
        assert!(sql.contains("(o.subtotal + o.shipping_fee + o.tax - o.discount) >= "));
        assert!(sql.contains("u.email ILIKE "));
        assert!(sql.contains("o.id::text ILIKE "));
    }

    #[test]
    fn test_status_change_follows_state_machine() {
        assert_eq!(
            validate_status_change("pending", "processing").unwrap(),
            FulfillmentStatus::Processing
        );
        assert!(matches!(
            validate_status_change("delivered", "pending"),
            Err(ApiError::InvalidTransition { .. })
        ));
        assert!(matches!(
            validate_status_change("pending", "refunded"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_same_status_is_a_no_op() {
        assert_eq!(
            validate_status_change("shipped", "shipped").unwrap(),
            FulfillmentStatus::Shipped
        );
    }
}

//! Storefront - Self-hosted Storefront Backend

use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Json, Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::{
    admin, cart, catalog, events::Publisher, orders, payos::PayosClient, AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(error) => {
                tracing::warn!(%error, "NATS unreachable, events disabled");
                None
            }
        },
        None => None,
    };

    let payos = config.payos.clone().map(PayosClient::new);
    if payos.is_none() {
        tracing::warn!("payment gateway not configured, cash-on-delivery only");
    }

    let port = config.port;
    let state = AppState { db, config: Arc::new(config), payos, events: Publisher::new(nats) };
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("storefront listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }),
        )
        .route("/api/products", get(catalog::list_products))
        .route("/api/products/:id", get(catalog::get_product))
        .route("/api/categories", get(catalog::list_categories))
        .route("/api/categories/:id", get(catalog::get_category))
        .route("/api/cart", get(cart::get_cart).delete(cart::clear_cart))
        .route("/api/cart/items", post(cart::add_item))
        .route("/api/cart/items/:product_id", put(cart::update_item).delete(cart::remove_item))
        .route("/api/orders", post(orders::create_order).get(orders::list_my_orders))
        .route("/api/orders/shipping-config", get(orders::shipping_config))
        .route("/api/orders/payos-webhook", post(orders::webhook::payos_webhook))
        .route("/api/orders/:id", get(orders::get_my_order))
        .route("/api/admin/products", post(catalog::create_product))
        .route(
            "/api/admin/products/:id",
            put(catalog::update_product).delete(catalog::delete_product),
        )
        .route("/api/admin/categories", post(catalog::create_category))
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/revenue", get(admin::revenue))
        .route("/api/admin/orders/:id", get(admin::get_order).delete(admin::delete_order))
        .route("/api/admin/orders/:id/status", put(admin::update_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! Shared application state.

use std::sync::Arc;

use crate::{config::AppConfig, events::Publisher, payos::PayosClient};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<AppConfig>,
    /// `None` when gateway credentials are absent: cash-on-delivery only.
    pub payos: Option<PayosClient>,
    pub events: Publisher,
}

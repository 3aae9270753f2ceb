//! API error taxonomy.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl
//! renders the uniform envelope with a conventional status code. Internal
//! errors keep their detail in the logs and surface a generic message,
//! except in debug builds.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("admin access required")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("only {available} of \"{name}\" available")]
    InsufficientStock { name: String, available: i32 },

    #[error("cart is empty")]
    EmptyCart,

    #[error("online payment is not available; choose cash-on-delivery instead")]
    PaymentUnavailable,

    #[error("could not create payment link: {0}")]
    PaymentLinkCreation(String),

    #[error("cannot change order status from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InsufficientStock { .. } | Self::EmptyCart => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::PaymentUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::PaymentLinkCreation(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Database(e) if cfg!(debug_assertions) => format!("database error: {e}"),
            Self::Internal(e) if cfg!(debug_assertions) => format!("internal error: {e}"),
            Self::Database(_) | Self::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }
        let body = json!({ "success": false, "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::EmptyCart.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("order").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::PaymentUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::PaymentLinkCreation("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        let transition = ApiError::InvalidTransition { from: "delivered".into(), to: "pending".into() };
        assert_eq!(transition.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_insufficient_stock_message_names_product() {
        let err = ApiError::InsufficientStock { name: "Widget".into(), available: 3 };
        assert_eq!(err.to_string(), "only 3 of \"Widget\" available");
    }
}

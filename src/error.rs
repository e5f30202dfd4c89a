//! API error taxonomy.
//!
//! Business-rule violations map to 4xx with their message in the body;
//! database and gateway failures are logged and surfaced as a generic 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("Insufficient stock for {0}")]
    InsufficientStock(String),
    #[error("Invalid payment signature")]
    InvalidSignature,
    #[error("Rating must be between 1 and 5")]
    InvalidRating,
    #[error("Can only review delivered orders")]
    OrderNotEligible,
    #[error("Product not found in this order")]
    ProductNotInOrder,
    #[error("You have already reviewed this product")]
    AlreadyReviewed,
    #[error("Invalid status")]
    InvalidStatus,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Gateway(#[from] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InsufficientStock(_)
            | Self::InvalidSignature
            | Self::InvalidRating
            | Self::OrderNotEligible
            | Self::ProductNotInOrder
            | Self::AlreadyReviewed
            | Self::InvalidStatus => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::ProductNotFound(_) => StatusCode::NOT_FOUND,
            Self::Database(_) | Self::Gateway(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

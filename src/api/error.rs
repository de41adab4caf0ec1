//! HTTP rendering of `EcommerceError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::EcommerceError;

const NOT_FOUND_MESSAGE: &str = "Not found";

impl EcommerceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidQuantity(_) | Self::InvalidShippingMethod(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::MissingSessionIdentity | Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::UpstreamPayment { retryable: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamPayment { retryable: false, .. } => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::InvalidShippingMethod(_) => "invalid_shipping_method",
            Self::Validation(_) => "validation_error",
            Self::MissingSessionIdentity => "missing_session",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::UpstreamPayment { .. } => "payment_provider_error",
            Self::InvalidSignature => "invalid_signature",
            Self::Persistence(_) => "internal_error",
        }
    }

    /// Client-safe text; storage and processor details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound => NOT_FOUND_MESSAGE.to_string(),
            Self::Persistence(_) => "Internal server error".to_string(),
            Self::Conflict(_) => "Conflicting write, try again".to_string(),
            Self::UpstreamPayment { retryable: true, .. } => "Payment provider unavailable, try again".to_string(),
            Self::UpstreamPayment { retryable: false, .. } => "Payment provider rejected the request".to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn log(&self) {
        match self {
            Self::Persistence(detail) => tracing::error!(error = %detail, "request failed"),
            Self::Conflict(detail) => tracing::warn!(error = %detail, "write conflict"),
            Self::UpstreamPayment { retryable, message } => tracing::warn!(retryable, error = %message, "payment provider call failed"),
            _ => {}
        }
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        self.log();
        let body = json!({ "error": self.code(), "message": self.public_message() });
        (self.status_code(), Json(body)).into_response()
    }
}

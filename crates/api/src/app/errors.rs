use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the HTTP handlers.
///
/// Store and bus details are logged by the handler; clients only see a
/// generic message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid order ID format")]
    InvalidOrderId,

    #[error("Failed to retrieve invoice")]
    InvoiceLookup,

    #[error("invalid order id: {0}")]
    InvalidHookBody(String),

    #[error("event bus unavailable")]
    Publish,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            // The lookup surface always answers with an `invoice` key.
            ApiError::InvalidOrderId => invoice_error(StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::InvoiceLookup => {
                invoice_error(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::InvalidHookBody(msg) => {
                json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
            }
            ApiError::Publish => json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "publish_error",
                "event bus unavailable",
            ),
        }
    }
}

pub fn invoice_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "message": message.into(),
            "invoice": null,
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

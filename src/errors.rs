use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Standard error body returned by every endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured detail (field errors, stock shortage), when the error kind has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Structured payload for a stock shortage, returned verbatim to the client
/// because the shopper can act on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockShortage {
    pub available_stock: i32,
    pub requested_quantity: i32,
    pub product_title: String,
    pub variant_size: Option<String>,
}

impl std::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant_size {
            Some(size) => write!(
                f,
                "{} ({}): requested {}, only {} available",
                self.product_title, size, self.requested_quantity, self.available_stock
            ),
            None => write!(
                f,
                "{}: requested {}, only {} available",
                self.product_title, self.requested_quantity, self.available_stock
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Field-level failures from checkout contact/shipping sanitization,
    /// accumulated so the client can render them all at once.
    #[error("Invalid fields: {}", format_field_errors(.0))]
    InvalidFields(BTreeMap<String, String>),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(StockShortage),

    #[error("Rate limit exceeded")]
    RateLimited { limit: u32, reset_secs: u64 },

    /// Bot-defense or equivalent verification failure. Intentionally carries
    /// no detail; internals are logged, never surfaced.
    #[error("Verification failed")]
    VerificationFailed,

    #[error("Webhook rejected: {0}")]
    WebhookRejected(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

fn format_field_errors(errors: &BTreeMap<String, String>) -> String {
    errors
        .iter()
        .map(|(field, msg)| format!("{}: {}", field, msg))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::BadRequest(_)
            | Self::InvalidFields(_)
            | Self::InsufficientStock(_)
            | Self::WebhookRejected(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::VerificationFailed => StatusCode::FORBIDDEN,
            Self::DatabaseError(_) | Self::PaymentFailed(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the message suitable for HTTP responses. Internal errors
    /// collapse to a generic message so implementation detail never leaks.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::PaymentFailed(_) => "Failed to create checkout session".to_string(),
            Self::RateLimited { .. } => "Too many requests, please try again later".to_string(),
            Self::VerificationFailed => "Request could not be verified".to_string(),
            Self::InvalidFields(_) => "Validation failed".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured detail to embed in the response body, where the kind has one.
    fn response_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::InvalidFields(errors) => Some(json!({ "errors": errors })),
            Self::InsufficientStock(shortage) => serde_json::to_value(shortage).ok(),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.response_details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let mut response = (status, Json(err)).into_response();

        // 429 responses convey quota metadata so clients can back off.
        if let ServiceError::RateLimited { limit, reset_secs } = self {
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", num_header(limit));
            headers.insert("X-RateLimit-Remaining", num_header(0u32));
            headers.insert("X-RateLimit-Reset", num_header(reset_secs));
            headers.insert(header::RETRY_AFTER, num_header(reset_secs));
        }

        response
    }
}

fn num_header<T: ToString>(n: T) -> HeaderValue {
    // Numeric strings are always valid header values.
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

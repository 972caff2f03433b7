//! boutique-api library
//!
//! Backend for an e-commerce storefront: catalog reads, cart pricing,
//! checkout-session creation, and payment-webhook reconciliation.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod rate_limiter;
pub mod sanitize;
pub mod services;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use std::time::Duration;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
    pub checkout_limiter: RateLimiter,
    pub cart_limiter: RateLimiter,
}

impl AppState {
    /// Builds the shared state: service graph plus the per-endpoint quota
    /// limiters. The payment gateway is injected so tests can stub it.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        gateway: Arc<dyn services::stripe::PaymentGateway>,
    ) -> Result<Self, errors::ServiceError> {
        let services =
            handlers::AppServices::new(db.clone(), &config, event_sender.clone(), gateway)?;
        let checkout_limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: config.checkout_rate_limit_requests,
            window_duration: Duration::from_secs(config.checkout_rate_limit_window_secs),
        });
        let cart_limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: config.cart_rate_limit_requests,
            window_duration: Duration::from_secs(config.cart_rate_limit_window_secs),
        });

        Ok(Self {
            db,
            config,
            event_sender,
            services,
            checkout_limiter,
            cart_limiter,
        })
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All public v1 routes.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Catalog reads
        .route("/products", get(handlers::products::list_products))
        .route("/products/:id", get(handlers::products::get_product))
        // Cart resolution for the client-persisted cart
        .route("/cart", post(handlers::cart::cart_products))
        // Checkout
        .route("/checkout", post(handlers::checkout::create_checkout))
        // Payment provider callback (signature-verified, no auth)
        .route("/webhooks/stripe", post(handlers::webhooks::stripe_webhook))
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "service": "boutique-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": { "database": db_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Ok(Json(ApiResponse::success(health_data)))
}

// Request logging middleware
pub async fn request_logging_middleware(
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    tracing::info!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        elapsed_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}

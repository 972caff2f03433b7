use crate::{
    errors::ServiceError,
    handlers::common::parse_body,
    rate_limiter::client_ip,
    services::checkout::CreateCheckoutRequest,
    AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

/// Create a checkout: validate and price the cart, persist a pending order,
/// and return the hosted-payment redirect URL.
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    responses(
        (status = 200, description = "Redirect URL for the hosted checkout", body = crate::services::checkout::CheckoutRedirect),
        (status = 400, description = "Invalid payload, unknown product/variant, or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 403, description = "Verification failed", body = crate::errors::ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment session or storage failure", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ServiceError> {
    let decision = state.checkout_limiter.check(&client_ip(&headers));
    if !decision.allowed {
        return Err(ServiceError::RateLimited {
            limit: decision.limit,
            reset_secs: decision.reset.as_secs(),
        });
    }

    let request: CreateCheckoutRequest = parse_body(body)?;
    let redirect = state.services.checkout.create_checkout(request).await?;

    let mut response = Json(redirect).into_response();
    decision.apply_headers(response.headers_mut());
    Ok(response)
}

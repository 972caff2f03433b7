use crate::{
    errors::ServiceError,
    services::{
        reconciliation::ReconcileOutcome,
        stripe::{self, StripeEvent},
    },
    AppState,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::error;

/// Stripe webhook endpoint.
///
/// The signature covers the raw body bytes, so this handler takes `Bytes`
/// and verifies before a single business field is parsed. Unhandled event
/// types acknowledge with 200 so the provider stops redelivering them.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/stripe",
    request_body = String,
    responses(
        (status = 200, description = "Event applied, duplicate, or intentionally ignored"),
        (status = 400, description = "Signature, freshness, or format failure", body = crate::errors::ErrorResponse),
        (status = 404, description = "Correlated order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Transient failure; provider should retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let secret = state.config.stripe_webhook_secret.as_deref().ok_or_else(|| {
        error!("stripe_webhook_secret not configured; rejecting webhook");
        ServiceError::InternalError("webhook secret not configured".to_string())
    })?;

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ServiceError::WebhookRejected("missing signature header".to_string()))?;

    stripe::verify_signature(
        &body,
        signature,
        secret,
        state.config.stripe_webhook_tolerance_secs,
        chrono::Utc::now().timestamp(),
    )?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|_| ServiceError::WebhookRejected("malformed event payload".to_string()))?;

    let outcome = state.services.reconciliation.process_event(&event).await?;
    Ok(match outcome {
        ReconcileOutcome::Processed => (StatusCode::OK, "ok"),
        ReconcileOutcome::AlreadyProcessed => (StatusCode::OK, "already processed"),
        ReconcileOutcome::Ignored => (StatusCode::OK, "ignored"),
        ReconcileOutcome::OrderNotFound => (StatusCode::NOT_FOUND, "order not found"),
    })
}

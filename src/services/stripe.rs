use crate::errors::ServiceError;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// One line item handed to the hosted checkout, in minor units. Amounts are
/// always server-derived; client prices never reach this type.
#[derive(Debug, Clone)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: i32,
}

/// Everything needed to open a hosted checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Correlation key embedded as session metadata; the webhook reconciler
    /// uses it to find the order again.
    pub order_id: Uuid,
    pub customer_email: String,
    pub currency: String,
    pub line_items: Vec<SessionLineItem>,
}

/// A created hosted-checkout session.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    pub id: String,
    pub url: String,
}

/// Seam to the hosted-payment provider. The production impl talks to Stripe;
/// tests substitute a stub.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;
}

/// Stripe-backed gateway using the form-encoded REST API.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    public_url: String,
}

impl StripeGateway {
    pub fn new(
        secret_key: String,
        public_url: String,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            secret_key,
            public_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("customer_email".into(), request.customer_email.clone()),
            (
                "success_url".into(),
                format!("{}/cart?success=1", self.public_url),
            ),
            (
                "cancel_url".into(),
                format!("{}/cart?canceled=1", self.public_url),
            ),
            (
                "metadata[order_id]".into(),
                request.order_id.to_string(),
            ),
        ];

        let currency = request.currency.to_lowercase();
        for (i, item) in request.line_items.iter().enumerate() {
            params.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
            params.push((
                format!("line_items[{}][price_data][currency]", i),
                currency.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            params.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount_cents.to_string(),
            ));
        }

        let response = self
            .http
            .post(CHECKOUT_SESSIONS_URL)
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Stripe session request failed: {}", e);
                ServiceError::PaymentFailed("gateway unreachable".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "Stripe rejected checkout session");
            return Err(ServiceError::PaymentFailed(format!(
                "gateway returned {}",
                status
            )));
        }

        let session: SessionResponse = response.json().await.map_err(|e| {
            error!("Stripe session response unreadable: {}", e);
            ServiceError::PaymentFailed("malformed gateway response".to_string())
        })?;

        let url = session.url.ok_or_else(|| {
            ServiceError::PaymentFailed("gateway session has no redirect URL".to_string())
        })?;

        Ok(GatewaySession {
            id: session.id,
            url,
        })
    }
}

/// Placeholder gateway used when no Stripe key is configured: every checkout
/// fails cleanly instead of the process refusing to boot. Catalog and cart
/// endpoints keep working.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn create_checkout_session(
        &self,
        _request: CheckoutSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        warn!("checkout attempted with no payment gateway configured");
        Err(ServiceError::PaymentFailed(
            "payment gateway not configured".to_string(),
        ))
    }
}

/// Parsed `checkout.session.completed`-style event envelope. Only the fields
/// the reconciler interprets are modeled.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event creation time, seconds since epoch
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: StripeEventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventObject {
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Verifies a `Stripe-Signature` header against the raw request body.
///
/// The signed payload is `"{t}.{body}"`; the header carries the timestamp
/// (`t=`) and the HMAC-SHA256 hex digest (`v1=`). Timestamps outside the
/// tolerance window are rejected even when the digest matches, which blocks
/// replay of captured signed payloads.
pub fn verify_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: u64,
    now_epoch: i64,
) -> Result<(), ServiceError> {
    let mut timestamp = "";
    let mut v1 = "";
    for part in signature_header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => timestamp = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }

    if timestamp.is_empty() || v1.is_empty() {
        warn!("Webhook signature header missing t/v1 components");
        return Err(ServiceError::WebhookRejected(
            "invalid signature header".to_string(),
        ));
    }

    let ts: i64 = timestamp.parse().map_err(|_| {
        ServiceError::WebhookRejected("invalid signature timestamp".to_string())
    })?;
    if (now_epoch - ts).unsigned_abs() > tolerance_secs {
        warn!(ts, now_epoch, "Webhook signature timestamp outside tolerance");
        return Err(ServiceError::WebhookRejected(
            "signature timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(payload, secret, ts)?;
    if !constant_time_eq(&expected, v1) {
        warn!("Webhook signature mismatch");
        return Err(ServiceError::WebhookRejected(
            "signature mismatch".to_string(),
        ));
    }

    Ok(())
}

/// Builds a full `Stripe-Signature` header value for a payload. Used by the
/// test harness and by outbound tooling that needs to self-sign.
pub fn signature_header(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, ServiceError> {
    let digest = compute_signature(payload, secret, timestamp)?;
    Ok(format!("t={},v1={}", timestamp, digest))
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::InternalError("invalid webhook secret".to_string()))?;
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = signature_header(payload, SECRET, now).unwrap();
        assert!(verify_signature(payload, &header, SECRET, 300, now).is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = signature_header(payload, SECRET, now).unwrap();
        let err = verify_signature(br#"{"id":"evt_2"}"#, &header, SECRET, 300, now).unwrap_err();
        assert!(matches!(err, ServiceError::WebhookRejected(_)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = b"payload";
        let now = 1_700_000_000;
        let header = signature_header(payload, SECRET, now).unwrap();
        assert!(verify_signature(payload, &header, "whsec_other", 300, now).is_err());
    }

    #[test]
    fn stale_signature_timestamp_is_rejected() {
        let payload = b"payload";
        let now = 1_700_000_000;
        let header = signature_header(payload, SECRET, now - 301).unwrap();
        let err = verify_signature(payload, &header, SECRET, 300, now).unwrap_err();
        assert!(matches!(err, ServiceError::WebhookRejected(_)));
    }

    #[test]
    fn missing_components_are_rejected() {
        assert!(verify_signature(b"x", "v1=abc", SECRET, 300, 0).is_err());
        assert!(verify_signature(b"x", "t=123", SECRET, 300, 0).is_err());
        assert!(verify_signature(b"x", "", SECRET, 300, 0).is_err());
    }

    #[test]
    fn event_envelope_parses() {
        let json = r#"{
            "id": "evt_123",
            "type": "checkout.session.completed",
            "created": 1700000000,
            "data": {"object": {"id": "cs_1", "metadata": {"order_id": "abc"}}}
        }"#;
        let event: StripeEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.data.object.metadata["order_id"], "abc");
    }
}

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    sanitize::{sanitize_checkout_info, CheckoutContactInput},
    services::{
        cart::{CartService, RawCartLine},
        orders::OrderService,
        pricing::{price_cart, PricedCart, ShippingPolicy},
        recaptcha::RecaptchaService,
        stripe::{CheckoutSessionRequest, PaymentGateway, SessionLineItem},
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, instrument};
use utoipa::ToSchema;

/// Checkout request body: contact/shipping fields plus the client cart,
/// one entry per unit. `cartProducts` carries both the structured and the
/// legacy line shapes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    #[serde(flatten)]
    pub contact: CheckoutContactInput,
    #[serde(default)]
    pub cart_products: Vec<RawCartLine>,
    #[serde(default)]
    pub recaptcha_token: Option<String>,
}

/// Success response: where to send the shopper.
#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutRedirect {
    #[serde(rename = "redirectUrl")]
    pub redirect_url: String,
}

/// Orchestrates cart validation, pricing, order persistence and
/// payment-session creation. Each step short-circuits on failure.
#[derive(Clone)]
pub struct CheckoutService {
    cart: Arc<CartService>,
    orders: Arc<OrderService>,
    gateway: Arc<dyn PaymentGateway>,
    recaptcha: Arc<RecaptchaService>,
    events: EventSender,
    shipping_policy: ShippingPolicy,
    currency: String,
}

impl CheckoutService {
    pub fn new(
        cart: Arc<CartService>,
        orders: Arc<OrderService>,
        gateway: Arc<dyn PaymentGateway>,
        recaptcha: Arc<RecaptchaService>,
        events: EventSender,
        shipping_policy: ShippingPolicy,
        currency: String,
    ) -> Self {
        Self {
            cart,
            orders,
            gateway,
            recaptcha,
            events,
            shipping_policy,
            currency,
        }
    }

    /// Turns an untrusted cart into a pending order and a hosted-payment
    /// redirect. The caller has already applied the per-IP quota.
    #[instrument(skip_all)]
    pub async fn create_checkout(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutRedirect, ServiceError> {
        self.events
            .send(Event::CheckoutStarted {
                cart_lines: request.cart_products.len(),
            })
            .await;

        self.recaptcha
            .verify(request.recaptcha_token.as_deref())
            .await?;

        let shipping = sanitize_checkout_info(&request.contact)
            .map_err(ServiceError::InvalidFields)?;

        let validated = self.cart.validate(&request.cart_products).await?;
        let priced = price_cart(&validated, &self.shipping_policy);

        let order = self
            .orders
            .create_pending_order(&shipping, &priced, &self.currency)
            .await?;

        // A gateway failure past this point strands the pending order; that
        // is accepted — it can never be paid, and retrying the checkout is
        // safe.
        let session = self
            .gateway
            .create_checkout_session(CheckoutSessionRequest {
                order_id: order.id,
                customer_email: shipping.email,
                currency: self.currency.clone(),
                line_items: session_line_items(&priced),
            })
            .await
            .map_err(|e| {
                error!(order_id = %order.id, "checkout session creation failed: {}", e);
                e
            })?;

        Ok(CheckoutRedirect {
            redirect_url: session.url,
        })
    }
}

/// Gateway line items re-derived from server prices; shipping rides along as
/// its own line when charged.
fn session_line_items(priced: &PricedCart) -> Vec<SessionLineItem> {
    let mut items: Vec<SessionLineItem> = priced
        .lines
        .iter()
        .map(|priced_line| {
            let line = &priced_line.line;
            let name = match &line.size {
                Some(size) => format!("{} ({} ml)", line.product_title, size),
                None => line.product_title.clone(),
            };
            SessionLineItem {
                name,
                unit_amount_cents: priced_line.unit_cents,
                quantity: line.quantity,
            }
        })
        .collect();

    if priced.shipping_cents > 0 {
        items.push(SessionLineItem {
            name: "Shipping".to_string(),
            unit_amount_cents: priced.shipping_cents,
            quantity: 1,
        });
    }

    items
}

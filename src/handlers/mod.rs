pub mod cart;
pub mod checkout;
pub mod common;
pub mod products;
pub mod webhooks;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::EventSender,
    services::{
        cart::CartService, catalog::CatalogService, checkout::CheckoutService,
        orders::OrderService, pricing::ShippingPolicy, recaptcha::RecaptchaService,
        reconciliation::ReconciliationService, stripe::PaymentGateway,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    /// Wires the service graph. The payment gateway comes from the caller so
    /// tests can substitute a stub.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Result<Self, ServiceError> {
        let catalog = Arc::new(CatalogService::new(db.clone()));
        let cart = Arc::new(CartService::new(catalog.clone()));
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let recaptcha = Arc::new(RecaptchaService::new(
            config.recaptcha_secret_key.clone(),
            config.recaptcha_score_threshold,
            Duration::from_secs(config.recaptcha_timeout_secs),
        )?);
        let checkout = Arc::new(CheckoutService::new(
            cart.clone(),
            orders.clone(),
            gateway,
            recaptcha,
            event_sender.clone(),
            ShippingPolicy::from_config(config),
            config.currency.clone(),
        ));
        let reconciliation = Arc::new(ReconciliationService::new(
            db,
            orders.clone(),
            event_sender,
            config.stripe_webhook_tolerance_secs,
        ));

        Ok(Self {
            catalog,
            cart,
            orders,
            checkout,
            reconciliation,
        })
    }
}

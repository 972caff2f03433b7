//! Shared test harness: an application backed by an in-memory SQLite
//! database, a seeded catalog, and a stub payment gateway.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use boutique_api::{
    api_v1_routes,
    config::AppConfig,
    db,
    entities::{brand, order, order_item, product, product_variant},
    errors::ServiceError,
    events::{self, EventSender},
    services::stripe::{
        signature_header, CheckoutSessionRequest, GatewaySession, PaymentGateway,
    },
    AppState,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Gateway stub: records every session request and can be flipped into a
/// failure mode.
pub struct StubGateway {
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
    fail: AtomicBool,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// The order id embedded in the most recent session request.
    pub fn last_order_id(&self) -> Uuid {
        self.requests
            .lock()
            .unwrap()
            .last()
            .expect("a checkout session was requested")
            .order_id
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        self.requests.lock().unwrap().push(request);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentFailed("stub failure".to_string()));
        }
        Ok(GatewaySession {
            id: "cs_test_session".to_string(),
            url: "https://checkout.stripe.test/cs_test_session".to_string(),
        })
    }
}

/// Helper harness for spinning up an application backed by an in-memory
/// SQLite database.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Same, with a configuration hook applied before wiring.
    pub async fn with_config(mutate: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 18_080, "test");
        // A single pooled connection keeps every query on the same in-memory
        // database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.stripe_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        mutate(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(StubGateway::new());
        let state = AppState::new(
            Arc::new(pool),
            cfg,
            event_sender,
            gateway.clone() as Arc<dyn PaymentGateway>,
        )
        .expect("failed to build app state");

        let router = Router::new()
            .nest("/api/v1", api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Issues a JSON request against the router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .expect("request completed")
    }

    /// Issues a raw webhook delivery with the given signature header.
    pub async fn deliver_webhook(&self, payload: &[u8], signature: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/webhooks/stripe")
            .header(header::CONTENT_TYPE, "application/json")
            .header("Stripe-Signature", signature)
            .body(Body::from(payload.to_vec()))
            .unwrap();
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request completed")
    }

    /// Delivers a correctly signed, fresh `checkout.session.completed` event.
    pub async fn deliver_completed_event(&self, event_id: &str, order_id: Uuid) -> Response {
        let now = Utc::now().timestamp();
        let payload = completed_event_payload(event_id, order_id, now);
        let signature = signature_header(&payload, WEBHOOK_SECRET, now).unwrap();
        self.deliver_webhook(&payload, &signature).await
    }

    // ==================== seeding ====================

    pub async fn seed_brand(&self, name: &str) -> brand::Model {
        let now = Utc::now();
        brand::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("brand seeded")
    }

    pub async fn seed_product(
        &self,
        title: &str,
        brand_id: Option<Uuid>,
        flat_price: Decimal,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            description: Set(format!("{} description", title)),
            brand_id: Set(brand_id),
            price: Set(flat_price),
            featured: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("product seeded")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        size: &str,
        price: Decimal,
        stock: i32,
    ) -> product_variant::Model {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            size: Set(size.to_string()),
            sku: Set(None),
            price: Set(price),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("variant seeded")
    }

    // ==================== inspection ====================

    pub async fn variant_stock(&self, variant_id: Uuid) -> i32 {
        product_variant::Entity::find_by_id(variant_id)
            .one(&*self.state.db)
            .await
            .expect("query ok")
            .expect("variant exists")
            .stock
    }

    pub async fn find_order(&self, order_id: Uuid) -> Option<order::Model> {
        order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("query ok")
    }

    pub async fn order_count(&self) -> u64 {
        use sea_orm::PaginatorTrait;
        order::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count ok")
    }

    pub async fn order_items(&self, order_id: Uuid) -> Vec<order_item::Model> {
        self.state
            .services
            .orders
            .find_order_items(order_id)
            .await
            .expect("items load")
    }
}

/// Serialized `checkout.session.completed` event with the order correlation
/// key in metadata.
pub fn completed_event_payload(event_id: &str, order_id: Uuid, created: i64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": created,
        "data": {
            "object": {
                "id": "cs_test_session",
                "metadata": { "order_id": order_id.to_string() }
            }
        }
    }))
    .unwrap()
}

/// Reads a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

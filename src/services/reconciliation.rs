use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    services::{catalog::CatalogService, orders::OrderService, stripe::StripeEvent},
};
use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const COMPLETED_EVENT_TYPE: &str = "checkout.session.completed";

/// Terminal disposition of a webhook delivery, mapped to an HTTP status by
/// the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// First valid delivery: stock decremented, order marked paid
    Processed,
    /// Duplicate delivery or already-paid order; success, no side effects
    AlreadyProcessed,
    /// Event type this service deliberately does not act on
    Ignored,
    /// The correlated order does not exist
    OrderNotFound,
}

/// Applies payment-completed events to orders and stock, exactly once per
/// event in externally visible effect despite at-least-once delivery.
///
/// Order state machine: `pending --(first valid completion event)--> paid`;
/// `paid` is terminal.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    orders: Arc<OrderService>,
    events: EventSender,
    /// Maximum accepted age of an event's embedded `created` timestamp
    freshness_tolerance_secs: u64,
}

impl ReconciliationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: Arc<OrderService>,
        events: EventSender,
        freshness_tolerance_secs: u64,
    ) -> Self {
        Self {
            db,
            orders,
            events,
            freshness_tolerance_secs,
        }
    }

    /// Processes a signature-verified payment event. The caller has already
    /// authenticated the raw payload; everything here is still treated as
    /// possibly duplicated or delayed.
    #[instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn process_event(
        &self,
        event: &StripeEvent,
    ) -> Result<ReconcileOutcome, ServiceError> {
        if event.event_type != COMPLETED_EVENT_TYPE {
            info!("ignoring webhook event type");
            return Ok(ReconcileOutcome::Ignored);
        }

        // Freshness: a correctly signed but old payload is a replay.
        let age = Utc::now().timestamp() - event.created;
        if age.unsigned_abs() > self.freshness_tolerance_secs {
            warn!(age, "rejecting stale webhook event");
            return Err(ServiceError::WebhookRejected(
                "event outside freshness window".to_string(),
            ));
        }

        let order_id = event
            .data
            .object
            .metadata
            .get("order_id")
            .ok_or_else(|| {
                warn!("webhook event has no order_id metadata");
                ServiceError::WebhookRejected("missing order_id metadata".to_string())
            })
            .and_then(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    warn!("webhook event has malformed order_id metadata");
                    ServiceError::WebhookRejected("malformed order_id metadata".to_string())
                })
            })?;

        // Event-level idempotency gate: this exact event was already applied
        // to some order.
        if let Some(order) = self.orders.find_by_event_id(&event.id).await? {
            info!(order_id = %order.id, "event already recorded, skipping");
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        // Order-level gate, covering a different event racing for the same
        // order before the event-level record exists.
        let order = match self.orders.find_order(order_id).await? {
            Some(order) => order,
            None => {
                warn!(%order_id, "webhook references unknown order");
                return Ok(ReconcileOutcome::OrderNotFound);
            }
        };
        if order.paid {
            info!(%order_id, "order already paid, skipping");
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        let items = self.orders.find_order_items(order_id).await?;

        // Claim + decrement commit together: a duplicate delivery either
        // loses the conditional claim or never sees a half-applied state.
        let txn = self.db.begin().await?;

        let claimed = OrderService::mark_paid(&txn, order_id, &event.id).await?;
        if !claimed {
            txn.rollback().await?;
            info!(%order_id, "lost paid-claim race to a concurrent delivery");
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        let mut applied = Vec::new();
        let mut shortfalls = Vec::new();
        for item in &items {
            // Legacy flat-price items track no stock.
            let Some(variant_id) = item.variant_id else {
                continue;
            };

            if CatalogService::decrement_stock(&txn, variant_id, item.quantity).await? {
                applied.push((item.product_id, variant_id, item.quantity));
            } else {
                // Oversold or variant gone. Payment is already captured, so
                // the order still completes; the discrepancy is recorded for
                // manual reconciliation.
                warn!(
                    %order_id,
                    product_id = %item.product_id,
                    %variant_id,
                    quantity = item.quantity,
                    "stock decrement not applied, continuing"
                );
                shortfalls.push((item.product_id, variant_id, item.quantity));
            }
        }

        txn.commit().await?;

        for (product_id, variant_id, quantity) in applied {
            self.events
                .send(Event::StockDecremented {
                    product_id,
                    variant_id,
                    quantity,
                })
                .await;
        }
        for (product_id, variant_id, requested) in shortfalls {
            self.events
                .send(Event::StockShortfall {
                    order_id,
                    product_id,
                    variant_id,
                    requested,
                })
                .await;
        }
        self.events
            .send(Event::OrderPaid {
                order_id,
                event_id: event.id.clone(),
            })
            .await;

        info!(%order_id, "order reconciled and marked paid");
        Ok(ReconcileOutcome::Processed)
    }
}

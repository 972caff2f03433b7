use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the services. Delivery is best-effort: a full
/// channel drops the event rather than back-pressuring a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutStarted {
        cart_lines: usize,
    },
    OrderCreated(Uuid),
    OrderPaid {
        order_id: Uuid,
        event_id: String,
    },
    StockDecremented {
        product_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    },
    /// A paid order referenced more stock than remained at reconciliation
    /// time; the discrepancy needs manual follow-up.
    StockShortfall {
        order_id: Uuid,
        product_id: Uuid,
        variant_id: Uuid,
        requested: i32,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event without ever failing the caller.
    pub async fn send(&self, event: Event) {
        if let Err(err) = self.sender.send(event).await {
            warn!("Dropping domain event, channel closed or full: {}", err);
        }
    }
}

/// Drains the event channel and logs each event. Runs as a detached task for
/// the lifetime of the process.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::CheckoutStarted { cart_lines } => {
                info!(cart_lines, "checkout started");
            }
            Event::OrderCreated(order_id) => {
                info!(%order_id, "order created");
            }
            Event::OrderPaid { order_id, event_id } => {
                info!(%order_id, %event_id, "order paid");
            }
            Event::StockDecremented {
                product_id,
                variant_id,
                quantity,
            } => {
                info!(%product_id, %variant_id, quantity, "stock decremented");
            }
            Event::StockShortfall {
                order_id,
                product_id,
                variant_id,
                requested,
            } => {
                warn!(
                    %order_id, %product_id, %variant_id, requested,
                    "stock shortfall during reconciliation, manual review needed"
                );
            }
        }
    }
}

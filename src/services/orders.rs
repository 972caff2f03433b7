use crate::{
    entities::{order, order_item, Order, OrderItem},
    errors::ServiceError,
    events::{Event, EventSender},
    sanitize::ShippingInfo,
    services::pricing::{cents_to_decimal, PricedCart},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order persistence: pending-order creation with frozen snapshots, lookups,
/// and the conditional paid transition that closes the webhook idempotency
/// gate.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    events: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, events: EventSender) -> Self {
        Self { db, events }
    }

    /// Persists a pending order plus its line-item snapshots in one
    /// transaction. The snapshots deep-copy price/size/brand/title out of the
    /// catalog; later catalog changes never touch a placed order.
    #[instrument(skip_all, fields(email = %shipping.email))]
    pub async fn create_pending_order(
        &self,
        shipping: &ShippingInfo,
        priced: &PricedCart,
        currency: &str,
    ) -> Result<order::Model, ServiceError> {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            name: Set(shipping.name.clone()),
            email: Set(shipping.email.clone()),
            street_address: Set(shipping.street_address.clone()),
            address_line2: Set(shipping.address_line2.clone()),
            city: Set(shipping.city.clone()),
            province: Set(shipping.province.clone()),
            postal_code: Set(shipping.postal_code.clone()),
            country: Set(shipping.country.clone()),
            phone: Set(shipping.phone.clone()),
            subtotal: Set(cents_to_decimal(priced.subtotal_cents)),
            shipping: Set(cents_to_decimal(priced.shipping_cents)),
            total: Set(cents_to_decimal(priced.total_cents)),
            currency: Set(currency.to_string()),
            paid: Set(false),
            stripe_event_id: Set(None),
            processed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let txn = self.db.begin().await?;
        let order = order.insert(&txn).await?;

        for (position, priced_line) in priced.lines.iter().enumerate() {
            let line = &priced_line.line;
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                product_title: Set(line.product_title.clone()),
                brand_name: Set(line.brand_name.clone()),
                size: Set(line.size.clone()),
                quantity: Set(line.quantity),
                position: Set(position as i32),
                unit_price: Set(cents_to_decimal(priced_line.unit_cents)),
                total_price: Set(cents_to_decimal(priced_line.total_cents)),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        txn.commit().await?;

        info!(%order_id, total = %order.total, "pending order created");
        self.events.send(Event::OrderCreated(order_id)).await;

        Ok(order)
    }

    pub async fn find_order(&self, id: Uuid) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find_by_id(id).one(&*self.db).await?)
    }

    /// Line items in snapshot order.
    pub async fn find_order_items(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?)
    }

    /// Event-level idempotency lookup: has any order already recorded this
    /// payment event?
    pub async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::StripeEventId.eq(event_id))
            .one(&*self.db)
            .await?)
    }

    /// Conditionally transitions an order to paid, recording the event that
    /// did it. Applies only while `paid = false`, so of N concurrent
    /// deliveries exactly one claims the order. Takes any connection so the
    /// reconciler can run it inside its transaction.
    pub async fn mark_paid<C: ConnectionTrait>(
        conn: &C,
        order_id: Uuid,
        event_id: &str,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let result = Order::update_many()
            .col_expr(order::Column::Paid, Expr::value(true))
            .col_expr(order::Column::StripeEventId, Expr::value(event_id))
            .col_expr(order::Column::ProcessedAt, Expr::value(Some(now)))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Paid.eq(false))
            .exec(conn)
            .await?;

        Ok(result.rows_affected > 0)
    }
}

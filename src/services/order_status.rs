use crate::db::DbPool;
use crate::entities::{order, order_item, order_status_history, Order, OrderItem, OrderModel, OrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{ORDER_CANCELLATIONS, ORDER_STATUS_CHANGES, RESTITUTION_FAILURES};
use crate::services::discounts::DiscountService;
use crate::services::inventory::{InventoryService, StockTarget};
use crate::services::loyalty::LoyaltyService;
use crate::services::orders::{OrderResponse, OrderService};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Order status transitions.
///
/// The happy path runs pending -> confirmed -> shipping -> delivered;
/// cancellation is reachable from any non-terminal state and carries the
/// restitution side effects. A transition is first claimed with a
/// conditional UPDATE on the previously read status, so concurrent
/// operators cannot apply the side effects twice; the loser of that race
/// gets a conflict.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    inventory: Arc<InventoryService>,
    discounts: Arc<DiscountService>,
    loyalty: Arc<LoyaltyService>,
    orders: Arc<OrderService>,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        inventory: Arc<InventoryService>,
        discounts: Arc<DiscountService>,
        loyalty: Arc<LoyaltyService>,
        orders: Arc<OrderService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
            discounts,
            loyalty,
            orders,
        }
    }

    /// Applies a status change requested by an operator. `shipped` is
    /// accepted as an alias for `shipping`; terminal orders reject every
    /// request with `OrderAlreadyFinal`.
    #[instrument(skip(self))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        target_raw: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let target = OrderStatus::parse(target_raw)
            .ok_or_else(|| ServiceError::InvalidStatus(target_raw.to_string()))?;

        let order = self.orders.get_order_model(order_id).await?;
        let current = order.status;

        if current.is_final() {
            return Err(ServiceError::OrderAlreadyFinal(current.to_string()));
        }

        // Claim the transition before any side effect. The filter on the
        // status we just read makes the claim exactly-once under races.
        let claimed = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(target))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(current))
            .exec(self.db.as_ref())
            .await?;

        if claimed.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {} was updated concurrently",
                order_id
            )));
        }

        if target == OrderStatus::Cancelled {
            self.run_cancellation_restitution(&order).await;
        }

        self.append_history(order_id, target).await?;

        ORDER_STATUS_CHANGES
            .with_label_values(&[target.as_str()])
            .inc();
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: current.to_string(),
                new_status: target.to_string(),
            })
            .await;
        if target == OrderStatus::Cancelled {
            ORDER_CANCELLATIONS.inc();
            self.event_sender
                .send_or_log(Event::OrderCancelled(order_id))
                .await;
        }

        info!(
            order_id = %order_id,
            from = %current,
            to = %target,
            "Order status changed"
        );

        self.orders.get_order(order_id).await
    }

    /// Returns what the cancelled order had reserved: stock per line, the
    /// discount usage slot, and the net points movement. Every item is
    /// best-effort; a failure is logged and counted, never fatal, so an
    /// order cannot get stuck un-cancellable because a product was deleted.
    async fn run_cancellation_restitution(&self, order: &OrderModel) {
        let items = match OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(self.db.as_ref())
            .await
        {
            Ok(items) => items,
            Err(e) => {
                RESTITUTION_FAILURES.with_label_values(&["load_items"]).inc();
                error!(order_id = %order.id, error = %e, "Could not load order lines for restock");
                Vec::new()
            }
        };

        for item in items {
            let target = StockTarget::for_line(item.product_id, item.variant_id);
            match self.inventory.restock(target, item.quantity).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        order_id = %order.id,
                        product_id = %item.product_id,
                        "Restock target no longer exists, skipping line"
                    );
                }
                Err(e) => {
                    RESTITUTION_FAILURES.with_label_values(&["restock"]).inc();
                    error!(
                        order_id = %order.id,
                        product_id = %item.product_id,
                        error = %e,
                        "Restock failed during cancellation"
                    );
                }
            }
        }

        if let Some(discount_code_id) = order.discount_code_id {
            match self.discounts.release_usage(discount_code_id).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        order_id = %order.id,
                        discount_code_id = %discount_code_id,
                        "Discount usage already at zero or code gone, nothing released"
                    );
                }
                Err(e) => {
                    RESTITUTION_FAILURES
                        .with_label_values(&["discount_release"])
                        .inc();
                    error!(
                        order_id = %order.id,
                        discount_code_id = %discount_code_id,
                        error = %e,
                        "Discount release failed during cancellation"
                    );
                }
            }
        }

        if let Some(customer_id) = order.customer_id {
            if order.points_spent > 0 || order.points_granted > 0 {
                if let Err(e) = self
                    .loyalty
                    .restore_on_cancel(customer_id, order.points_spent, order.points_granted)
                    .await
                {
                    RESTITUTION_FAILURES
                        .with_label_values(&["points_restore"])
                        .inc();
                    error!(
                        order_id = %order.id,
                        customer_id = %customer_id,
                        error = %e,
                        "Points restitution failed during cancellation"
                    );
                }
            }
        }
    }

    async fn append_history(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<(), ServiceError> {
        let entry = order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(status),
            created_at: Set(Utc::now()),
        };
        entry.insert(self.db.as_ref()).await?;
        Ok(())
    }
}

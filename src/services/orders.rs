use crate::db::DbPool;
use crate::entities::{
    order, order_item, order_status_history, Order, OrderItem, OrderItemModel, OrderModel,
    OrderStatus, OrderStatusHistory, OrderStatusHistoryModel,
};
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Read side of the order store: single-order lookup and filtered listing,
/// both serialized with the frozen line snapshots and the full status
/// history (most recent first).
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn get_order_model(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, ServiceError> {
        let order = self.get_order_model(order_id).await?;

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        let history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        Ok(OrderResponse::assemble(order, items, history))
    }

    /// Orders newest first, optionally filtered by customer and status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        query: ListOrdersQuery,
    ) -> Result<(Vec<OrderResponse>, u64), ServiceError> {
        let mut select = Order::find().order_by_desc(order::Column::CreatedAt);

        if let Some(customer_id) = query.customer_id {
            select = select.filter(order::Column::CustomerId.eq(customer_id));
        }
        if let Some(raw) = query.status.as_deref() {
            let status = OrderStatus::parse(raw)
                .ok_or_else(|| ServiceError::InvalidStatus(raw.to_string()))?;
            select = select.filter(order::Column::Status.eq(status));
        }

        let paginator = select.paginate(self.db.as_ref(), query.per_page.clamp(1, 100));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(query.page.saturating_sub(1)).await?;

        let responses = self.assemble_many(orders).await?;
        Ok((responses, total))
    }

    /// Loads lines and histories for a page of orders in two batch queries.
    async fn assemble_many(
        &self,
        orders: Vec<OrderModel>,
    ) -> Result<Vec<OrderResponse>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        for item in items {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let mut history_by_order: HashMap<Uuid, Vec<OrderStatusHistoryModel>> = HashMap::new();
        let history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.is_in(order_ids))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        for entry in history {
            history_by_order.entry(entry.order_id).or_default().push(entry);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                let history = history_by_order.remove(&order.id).unwrap_or_default();
                OrderResponse::assemble(order, items, history)
            })
            .collect())
    }
}

/// Filters and paging for the order list
#[derive(Debug, Default)]
pub struct ListOrdersQuery {
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

/// Order as returned to clients
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub contact_name: String,
    pub contact_email: String,
    pub shipping_address: serde_json::Value,
    pub payment_method: String,
    pub discount_code_id: Option<Uuid>,
    pub discount_amount: Decimal,
    pub points_spent: i32,
    pub points_granted: i32,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItemResponse>,
    /// Most recent entry first; never truncated.
    pub status_history: Vec<OrderStatusEntry>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_subtotal: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderStatusEntry {
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn assemble(
        order: OrderModel,
        items: Vec<OrderItemModel>,
        history: Vec<OrderStatusHistoryModel>,
    ) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            contact_name: order.contact_name,
            contact_email: order.contact_email,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            discount_code_id: order.discount_code_id,
            discount_amount: order.discount_amount,
            points_spent: order.points_spent,
            points_granted: order.points_granted,
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            total: order.total,
            status: order.status.to_string(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            status_history: history.into_iter().map(OrderStatusEntry::from).collect(),
        }
    }
}

impl From<OrderItemModel> for OrderItemResponse {
    fn from(item: OrderItemModel) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            name: item.name,
            sku: item.sku,
            quantity: item.quantity,
            unit_price: item.unit_price,
            line_subtotal: item.line_subtotal,
        }
    }
}

impl From<OrderStatusHistoryModel> for OrderStatusEntry {
    fn from(entry: OrderStatusHistoryModel) -> Self {
        Self {
            status: entry.status.to_string(),
            created_at: entry.created_at,
        }
    }
}

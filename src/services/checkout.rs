use crate::db::DbPool;
use crate::entities::{
    customer_address, order, order_item, order_status_history, CartItemModel, Customer,
    CustomerAddress, CustomerAddressModel, CustomerModel, DiscountCodeModel, OrderModel,
    OrderStatus,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics::{
    CHECKOUT_ATTEMPTS, CHECKOUT_FAILURES, CHECKOUT_SUCCESSES, COMPENSATION_FAILURES,
};
use crate::services::carts::CartService;
use crate::services::catalog::CatalogService;
use crate::services::discounts::DiscountService;
use crate::services::inventory::{InventoryService, StockTarget};
use crate::services::loyalty::LoyaltyService;
use crate::services::orders::{OrderResponse, OrderService};
use crate::services::pricing::{self, PricedLine};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// The checkout pipeline: selected cart lines in, a pending order out.
///
/// Stock, discount usage, and loyalty points live on three independent
/// counters with no shared transaction; each reservation is a single
/// conditional write, and a failure after earlier reservations succeeded
/// undoes them in reverse order before the original error is returned.
/// Once the order row exists the reservations are final.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: Arc<CatalogService>,
    inventory: Arc<InventoryService>,
    discounts: Arc<DiscountService>,
    loyalty: Arc<LoyaltyService>,
    carts: Arc<CartService>,
    orders: Arc<OrderService>,
    shipping_fee: Decimal,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        catalog: Arc<CatalogService>,
        inventory: Arc<InventoryService>,
        discounts: Arc<DiscountService>,
        loyalty: Arc<LoyaltyService>,
        carts: Arc<CartService>,
        orders: Arc<OrderService>,
        shipping_fee: Decimal,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            inventory,
            discounts,
            loyalty,
            carts,
            orders,
            shipping_fee,
        }
    }

    /// Runs a checkout call end to end. At most one order is created; any
    /// failure before the order commit leaves stock and discount state as
    /// it was before the call.
    #[instrument(skip(self, input), fields(cart_id = %input.cart_id))]
    pub async fn checkout(&self, input: CheckoutInput) -> Result<OrderResponse, ServiceError> {
        CHECKOUT_ATTEMPTS.inc();

        match self.run(input).await {
            Ok(response) => {
                CHECKOUT_SUCCESSES.inc();
                Ok(response)
            }
            Err(e) => {
                CHECKOUT_FAILURES.with_label_values(&[e.code()]).inc();
                Err(e)
            }
        }
    }

    async fn run(&self, input: CheckoutInput) -> Result<OrderResponse, ServiceError> {
        let cart = self.carts.get_cart(input.cart_id).await?;

        let owner = match cart.customer_id {
            Some(customer_id) => Some(
                Customer::find_by_id(customer_id)
                    .one(self.db.as_ref())
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Customer {} not found", customer_id))
                    })?,
            ),
            None => None,
        };

        // Match the selection against the cart. IDs that match nothing are
        // ignored; a selection that matches nothing at all is an error.
        let cart_lines = self.carts.list_items(cart.id).await?;
        let selected = select_lines(&cart_lines, &input.selected_items);
        if selected.is_empty() {
            return Err(ServiceError::EmptySelection);
        }
        let consumed_ids: Vec<Uuid> = selected.iter().map(|l| l.id).collect();

        // Step 1: re-price every surviving line against the live catalog.
        let mut priced: Vec<PricedLine> = Vec::with_capacity(selected.len());
        for line in &selected {
            let product = match self.catalog.resolve_active_product(line.product_id).await? {
                Some(product) => product,
                None => {
                    warn!(
                        line_id = %line.id,
                        product_id = %line.product_id,
                        "Dropping line, product no longer purchasable"
                    );
                    continue;
                }
            };
            let variant = match line.variant_id {
                Some(variant_id) => match self.catalog.resolve_variant(variant_id).await? {
                    Some(variant) => Some(variant),
                    None => {
                        warn!(
                            line_id = %line.id,
                            variant_id = %variant_id,
                            "Dropping line, variant no longer exists"
                        );
                        continue;
                    }
                },
                None => None,
            };
            priced.push(PricedLine::from_catalog(line, &product, variant.as_ref()));
        }
        if priced.is_empty() {
            return Err(ServiceError::EmptySelection);
        }

        let subtotal = pricing::subtotal(&priced);
        let mut total = subtotal + self.shipping_fee;

        // Step 2: eligibility checks, before anything is reserved. Shape
        // problems with the request are also rejected here so a malformed
        // call never touches a counter.
        let balance = owner.as_ref().map(|c| c.loyalty_points).unwrap_or(0);
        if owner.is_none() && input.used_points > 0 {
            return Err(ServiceError::GuestPointsNotAllowed);
        }
        if owner.is_some() && input.used_points > balance {
            return Err(ServiceError::InsufficientPoints(format!(
                "requested {}, balance {}",
                input.used_points, balance
            )));
        }
        if input.shipping_address.is_none()
            && (owner.is_none() || input.shipping_address_id.is_none())
        {
            return Err(ServiceError::ValidationError(
                "A shipping address is required".to_string(),
            ));
        }
        if owner.is_none() && input.contact_email.is_none() {
            return Err(ServiceError::ValidationError(
                "Guest checkout requires a contact email".to_string(),
            ));
        }

        // Step 3: reserve stock line by line. The first miss undoes every
        // earlier reservation and fails the call.
        let mut log = CompensationLog::default();
        for line in &priced {
            let target = StockTarget::for_line(line.product_id, line.variant_id);
            let reserved = match self.inventory.reserve(target, line.quantity).await {
                Ok(reserved) => reserved,
                Err(e) => {
                    self.compensate(log).await;
                    return Err(e);
                }
            };
            if !reserved {
                self.compensate(log).await;
                return Err(ServiceError::OutOfStock(line.name.clone()));
            }
            log.record_stock(target, line.quantity);
        }

        // Step 4: take the discount usage slot, if the cart carries a code.
        let mut discount: Option<DiscountCodeModel> = None;
        let mut discount_amount = Decimal::ZERO;
        if let Some(discount_code_id) = cart.discount_code_id {
            match self.discounts.get_discount(discount_code_id).await {
                Ok(code) => {
                    let reserved = match self.discounts.reserve_usage(code.id).await {
                        Ok(reserved) => reserved,
                        Err(e) => {
                            self.compensate(log).await;
                            return Err(e);
                        }
                    };
                    if !reserved {
                        self.compensate(log).await;
                        return Err(ServiceError::DiscountExhausted(code.code));
                    }
                    log.record_discount(code.id, code.code.clone());
                    discount_amount = pricing::discount_amount(subtotal, code.percent_value);
                    total = subtotal - discount_amount + self.shipping_fee;
                    discount = Some(code);
                }
                Err(ServiceError::NotFound(_)) => {
                    warn!(
                        cart_id = %cart.id,
                        discount_code_id = %discount_code_id,
                        "Cart references a deleted discount code, proceeding without it"
                    );
                }
                Err(e) => {
                    self.compensate(log).await;
                    return Err(e);
                }
            }
        }

        // Step 5: clamp and apply the points spend. The actual balance
        // debit happens inside the order transaction.
        let points_spent = if owner.is_some() {
            pricing::clamp_points_to_spend(input.used_points, total, balance)
        } else {
            0
        };
        total = pricing::apply_points(total, points_spent);

        // Step 6: resolve the shipping snapshot and the contact fields.
        let shipping = match self.resolve_shipping_address(owner.as_ref(), &input).await {
            Ok(shipping) => shipping,
            Err(e) => {
                self.compensate(log).await;
                return Err(e);
            }
        };
        let contact_name = input
            .contact_name
            .clone()
            .or_else(|| owner.as_ref().map(|c| c.name.clone()))
            .unwrap_or_else(|| shipping.recipient_name.clone());
        let contact_email = match input
            .contact_email
            .clone()
            .or_else(|| owner.as_ref().map(|c| c.email.clone()))
        {
            Some(email) => email,
            None => {
                self.compensate(log).await;
                return Err(ServiceError::ValidationError(
                    "A contact email is required".to_string(),
                ));
            }
        };

        // Points granted are computed on the final total; guests earn none.
        let points_granted = if owner.is_some() {
            pricing::points_earned(total)
        } else {
            0
        };

        // Step 7: the commit point. Order, line snapshots, initial history
        // entry, and the net points movement share one transaction.
        let order_model = match self
            .create_order(CreateOrder {
                owner: owner.as_ref(),
                priced: &priced,
                shipping: &shipping,
                contact_name,
                contact_email,
                payment_method: input.payment_method.clone(),
                discount: discount.as_ref(),
                discount_amount,
                subtotal,
                total,
                points_spent,
                points_granted,
            })
            .await
        {
            Ok(order_model) => order_model,
            Err(e) => {
                self.compensate(log).await;
                return Err(e);
            }
        };

        // Step 8: cart cleanup, best-effort. The order exists; a failure
        // here is logged, never surfaced.
        if let Err(e) = self.carts.consume_lines(cart.id, &consumed_ids).await {
            error!(
                cart_id = %cart.id,
                order_id = %order_model.id,
                error = %e,
                "Cart cleanup failed after checkout"
            );
        }

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                cart_id: cart.id,
                order_id: order_model.id,
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCreated(order_model.id))
            .await;

        info!(
            order_id = %order_model.id,
            cart_id = %cart.id,
            total = %order_model.total,
            points_spent,
            points_granted,
            "Checkout completed"
        );

        self.orders.get_order(order_model.id).await
    }

    /// Saved address for a registered owner when a reference was supplied,
    /// the inline address otherwise.
    async fn resolve_shipping_address(
        &self,
        owner: Option<&CustomerModel>,
        input: &CheckoutInput,
    ) -> Result<ShippingAddress, ServiceError> {
        if let (Some(owner), Some(address_id)) = (owner, input.shipping_address_id) {
            let saved = CustomerAddress::find_by_id(address_id)
                .filter(customer_address::Column::CustomerId.eq(owner.id))
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Shipping address {} not found", address_id))
                })?;
            return Ok(ShippingAddress::from(&saved));
        }

        input.shipping_address.clone().ok_or_else(|| {
            ServiceError::ValidationError("A shipping address is required".to_string())
        })
    }

    async fn create_order(&self, params: CreateOrder<'_>) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let address_json = serde_json::to_value(params.shipping).map_err(|e| {
            ServiceError::InternalError(format!("Shipping address serialization failed: {}", e))
        })?;

        let order_row = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(params.owner.map(|c| c.id)),
            contact_name: Set(params.contact_name),
            contact_email: Set(params.contact_email),
            shipping_address: Set(address_json),
            payment_method: Set(params.payment_method),
            discount_code_id: Set(params.discount.map(|d| d.id)),
            discount_amount: Set(params.discount_amount),
            points_spent: Set(params.points_spent),
            points_granted: Set(params.points_granted),
            subtotal: Set(params.subtotal),
            shipping_fee: Set(self.shipping_fee),
            total: Set(params.total),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order_model = order_row.insert(&txn).await?;

        for line in params.priced {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                name: Set(line.name.clone()),
                sku: Set(line.sku.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_subtotal: Set(line.line_subtotal),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        let history = order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
        };
        history.insert(&txn).await?;

        if let Some(owner) = params.owner {
            if params.points_spent > 0 || params.points_granted > 0 {
                let settled = self
                    .loyalty
                    .settle_points(&txn, owner.id, params.points_spent, params.points_granted)
                    .await?;
                if !settled {
                    if let Err(rollback_err) = txn.rollback().await {
                        error!(
                            order_id = %order_id,
                            error = %rollback_err,
                            "Rollback failed after points settlement miss"
                        );
                    }
                    return Err(ServiceError::InsufficientPoints(format!(
                        "balance dropped below {} while placing the order",
                        params.points_spent
                    )));
                }
            }
        }

        txn.commit().await?;
        Ok(order_model)
    }

    /// Undoes reservations in reverse order. Failures are logged and
    /// counted, never propagated; the caller returns the error that
    /// triggered the compensation.
    async fn compensate(&self, log: CompensationLog) {
        for action in log.actions.into_iter().rev() {
            match action {
                ReleaseAction::Restock { target, quantity } => {
                    match self.inventory.restock(target, quantity).await {
                        Ok(true) => {}
                        Ok(false) => {
                            warn!(?target, quantity, "Compensating restock target missing");
                        }
                        Err(e) => {
                            COMPENSATION_FAILURES.with_label_values(&["restock"]).inc();
                            error!(
                                ?target,
                                quantity,
                                error = %e,
                                "Compensating restock failed"
                            );
                        }
                    }
                }
                ReleaseAction::ReleaseDiscountSlot {
                    discount_code_id,
                    code,
                } => match self.discounts.release_usage(discount_code_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(code = %code, "Compensating discount release found nothing to return");
                    }
                    Err(e) => {
                        COMPENSATION_FAILURES
                            .with_label_values(&["discount_release"])
                            .inc();
                        error!(code = %code, error = %e, "Compensating discount release failed");
                    }
                },
            }
        }
    }
}

/// Lines matching the selection, deduplicated, in selection order.
fn select_lines(cart_lines: &[CartItemModel], selection: &[Uuid]) -> Vec<CartItemModel> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for id in selection {
        if seen.insert(*id) {
            if let Some(line) = cart_lines.iter().find(|l| l.id == *id) {
                selected.push(line.clone());
            }
        }
    }
    selected
}

struct CreateOrder<'a> {
    owner: Option<&'a CustomerModel>,
    priced: &'a [PricedLine],
    shipping: &'a ShippingAddress,
    contact_name: String,
    contact_email: String,
    payment_method: String,
    discount: Option<&'a DiscountCodeModel>,
    discount_amount: Decimal,
    subtotal: Decimal,
    total: Decimal,
    points_spent: i32,
    points_granted: i32,
}

/// Reservations taken so far in a checkout call, undone in reverse when a
/// later step fails.
#[derive(Default)]
struct CompensationLog {
    actions: Vec<ReleaseAction>,
}

impl CompensationLog {
    fn record_stock(&mut self, target: StockTarget, quantity: i32) {
        self.actions.push(ReleaseAction::Restock { target, quantity });
    }

    fn record_discount(&mut self, discount_code_id: Uuid, code: String) {
        self.actions.push(ReleaseAction::ReleaseDiscountSlot {
            discount_code_id,
            code,
        });
    }
}

enum ReleaseAction {
    Restock {
        target: StockTarget,
        quantity: i32,
    },
    ReleaseDiscountSlot {
        discount_code_id: Uuid,
        code: String,
    },
}

/// Checkout request payload
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CheckoutInput {
    pub cart_id: Uuid,
    /// Cart line ids to check out; unknown ids are ignored.
    pub selected_items: Vec<Uuid>,
    /// Saved address reference, registered customers only.
    pub shipping_address_id: Option<Uuid>,
    #[validate]
    pub shipping_address: Option<ShippingAddress>,
    #[validate(length(min = 1, max = 100))]
    pub payment_method: String,
    /// Loyalty points to spend; clamped to what the order and balance allow.
    #[serde(default)]
    #[validate(range(min = 0))]
    pub used_points: i32,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
}

/// Shipping address snapshot stored on the order
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 200))]
    pub recipient_name: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 100))]
    pub country: String,
}

impl From<&CustomerAddressModel> for ShippingAddress {
    fn from(address: &CustomerAddressModel) -> Self {
        Self {
            recipient_name: address.recipient_name.clone(),
            phone: address.phone.clone(),
            line1: address.line1.clone(),
            line2: address.line2.clone(),
            city: address.city.clone(),
            state: address.state.clone(),
            postal_code: address.postal_code.clone(),
            country: address.country.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn line(cart_id: Uuid) -> CartItemModel {
        CartItemModel {
            id: Uuid::new_v4(),
            cart_id,
            product_id: Uuid::new_v4(),
            variant_id: None,
            quantity: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn selection_keeps_request_order_and_dedupes() {
        let cart_id = Uuid::new_v4();
        let a = line(cart_id);
        let b = line(cart_id);
        let c = line(cart_id);
        let lines = vec![a.clone(), b.clone(), c.clone()];

        let picked = select_lines(&lines, &[c.id, a.id, c.id]);
        let picked_ids: Vec<Uuid> = picked.iter().map(|l| l.id).collect();
        assert_eq!(picked_ids, vec![c.id, a.id]);
    }

    #[test]
    fn selection_ignores_unknown_ids() {
        let cart_id = Uuid::new_v4();
        let a = line(cart_id);
        let lines = vec![a.clone()];

        let picked = select_lines(&lines, &[Uuid::new_v4(), a.id]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, a.id);
    }

    #[test]
    fn empty_selection_matches_nothing() {
        let lines = vec![line(Uuid::new_v4())];
        assert!(select_lines(&lines, &[]).is_empty());
        assert!(select_lines(&lines, &[Uuid::new_v4()]).is_empty());
    }
}

use crate::db::DbPool;
use crate::entities::{
    cart, cart_item, discount_code, Cart, CartItem, CartItemModel, CartModel, DiscountCode,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::catalog::CatalogService;
use crate::services::pricing::{self, PricedLine};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Shopping cart operations.
///
/// Carts never store prices; every read re-prices the lines against the live
/// catalog, and lines whose product has gone away are skipped rather than
/// surfaced as errors.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: Arc<CatalogService>,
}

impl CartService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        catalog: Arc<CatalogService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
        }
    }

    /// Creates a cart. A registered customer keeps one open cart, so an
    /// existing one is returned instead of a duplicate; guest carts are
    /// always fresh and addressed by id.
    #[instrument(skip(self))]
    pub async fn create_cart(
        &self,
        customer_id: Option<Uuid>,
    ) -> Result<CartModel, ServiceError> {
        if let Some(customer_id) = customer_id {
            let existing = Cart::find()
                .filter(cart::Column::CustomerId.eq(customer_id))
                .one(self.db.as_ref())
                .await?;
            if let Some(cart) = existing {
                return Ok(cart);
            }
        }

        let cart_id = Uuid::new_v4();
        let now = Utc::now();
        let model = cart::ActiveModel {
            id: Set(cart_id),
            customer_id: Set(customer_id),
            discount_code_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let cart = model.insert(self.db.as_ref()).await?;

        self.event_sender.send_or_log(Event::CartCreated(cart_id)).await;

        info!(cart_id = %cart_id, "Cart created");
        Ok(cart)
    }

    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartModel, ServiceError> {
        Cart::find_by_id(cart_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }

    pub async fn list_items(&self, cart_id: Uuid) -> Result<Vec<CartItemModel>, ServiceError> {
        CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(Into::into)
    }

    /// The cart with its lines re-priced against the catalog.
    #[instrument(skip(self))]
    pub async fn get_cart_response(&self, cart_id: Uuid) -> Result<CartResponse, ServiceError> {
        let cart = self.get_cart(cart_id).await?;
        let items = self.list_items(cart_id).await?;

        let mut priced = Vec::with_capacity(items.len());
        for item in &items {
            match self.price_line(item).await? {
                Some(line) => priced.push(line),
                None => {
                    warn!(
                        cart_id = %cart_id,
                        line_id = %item.id,
                        product_id = %item.product_id,
                        "Skipping cart line without a live catalog entry"
                    );
                }
            }
        }

        let discount_code = match cart.discount_code_id {
            Some(id) => DiscountCode::find_by_id(id)
                .one(self.db.as_ref())
                .await?
                .map(|d| d.code),
            None => None,
        };

        let subtotal = pricing::subtotal(&priced);

        Ok(CartResponse {
            id: cart.id,
            customer_id: cart.customer_id,
            discount_code,
            items: priced.into_iter().map(CartItemResponse::from).collect(),
            subtotal,
        })
    }

    /// Adds a line to the cart. A line for the same product and variant is
    /// merged by bumping its quantity.
    #[instrument(skip(self, input))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartItemModel, ServiceError> {
        let cart = self.get_cart(cart_id).await?;

        let product = self
            .catalog
            .resolve_active_product(input.product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        if let Some(variant_id) = input.variant_id {
            let variant = self.catalog.resolve_variant(variant_id).await?.ok_or_else(|| {
                ServiceError::NotFound(format!("Variant {} not found", variant_id))
            })?;
            if variant.product_id != product.id {
                return Err(ServiceError::ValidationError(format!(
                    "Variant {} does not belong to product {}",
                    variant_id, product.id
                )));
            }
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .filter(match input.variant_id {
                Some(variant_id) => cart_item::Column::VariantId.eq(variant_id),
                None => cart_item::Column::VariantId.is_null(),
            })
            .one(self.db.as_ref())
            .await?;

        let item = if let Some(existing) = existing {
            let merged_quantity = existing.quantity + input.quantity;
            let mut active: cart_item::ActiveModel = existing.into();
            active.quantity = Set(merged_quantity);
            active.updated_at = Set(Utc::now());
            active.update(self.db.as_ref()).await?
        } else {
            let now = Utc::now();
            let model = cart_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                product_id: Set(input.product_id),
                variant_id: Set(input.variant_id),
                quantity: Set(input.quantity),
                created_at: Set(now),
                updated_at: Set(now),
            };
            model.insert(self.db.as_ref()).await?
        };

        self.touch_cart(&cart).await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                product_id: input.product_id,
            })
            .await;

        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let cart = self.get_cart(cart_id).await?;
        let item = self.get_cart_item(cart_id, item_id).await?;

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let item = active.update(self.db.as_ref()).await?;

        self.touch_cart(&cart).await?;

        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let cart = self.get_cart(cart_id).await?;
        let item = self.get_cart_item(cart_id, item_id).await?;

        item.delete(self.db.as_ref()).await?;

        self.clear_discount_if_empty(&cart).await?;
        self.touch_cart(&cart).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;

        Ok(())
    }

    /// Attaches a discount code to the cart. The usage slot is only taken
    /// at checkout; this merely records the reference, refusing codes that
    /// are already exhausted.
    #[instrument(skip(self))]
    pub async fn apply_discount(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CartModel, ServiceError> {
        let cart = self.get_cart(cart_id).await?;

        let discount = DiscountCode::find()
            .filter(discount_code::Column::Code.eq(code))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Discount code '{}' not found", code))
            })?;

        if discount.is_exhausted() {
            return Err(ServiceError::DiscountExhausted(discount.code));
        }

        let discount_id = discount.id;
        let mut active: cart::ActiveModel = cart.into();
        active.discount_code_id = Set(Some(discount_id));
        active.updated_at = Set(Utc::now());
        let cart = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::DiscountApplied {
                cart_id,
                discount_code_id: discount_id,
            })
            .await;

        Ok(cart)
    }

    #[instrument(skip(self))]
    pub async fn remove_discount(&self, cart_id: Uuid) -> Result<CartModel, ServiceError> {
        let cart = self.get_cart(cart_id).await?;

        let mut active: cart::ActiveModel = cart.into();
        active.discount_code_id = Set(None);
        active.updated_at = Set(Utc::now());
        let cart = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::DiscountRemoved { cart_id })
            .await;

        Ok(cart)
    }

    /// Removes checked-out lines from the cart. Runs after the order commit,
    /// so failures are the caller's to log, never to surface. An emptied
    /// cart also loses its discount reference.
    #[instrument(skip(self))]
    pub async fn consume_lines(
        &self,
        cart_id: Uuid,
        line_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        if line_ids.is_empty() {
            return Ok(());
        }

        let cart = self.get_cart(cart_id).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::Id.is_in(line_ids.iter().copied()))
            .exec(self.db.as_ref())
            .await?;

        self.clear_discount_if_empty(&cart).await?;
        self.touch_cart(&cart).await?;

        Ok(())
    }

    async fn get_cart_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<CartItemModel, ServiceError> {
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Cart item {} not found in cart {}", item_id, cart_id))
            })
    }

    async fn price_line(
        &self,
        item: &CartItemModel,
    ) -> Result<Option<PricedLine>, ServiceError> {
        let product = match self.catalog.resolve_active_product(item.product_id).await? {
            Some(product) => product,
            None => return Ok(None),
        };

        let variant = match item.variant_id {
            Some(variant_id) => match self.catalog.resolve_variant(variant_id).await? {
                Some(variant) => Some(variant),
                None => return Ok(None),
            },
            None => None,
        };

        Ok(Some(PricedLine::from_catalog(
            item,
            &product,
            variant.as_ref(),
        )))
    }

    async fn clear_discount_if_empty(&self, cart: &CartModel) -> Result<(), ServiceError> {
        if cart.discount_code_id.is_none() {
            return Ok(());
        }

        let remaining = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .count(self.db.as_ref())
            .await?;

        if remaining == 0 {
            let mut active: cart::ActiveModel = cart.clone().into();
            active.discount_code_id = Set(None);
            active.updated_at = Set(Utc::now());
            active.update(self.db.as_ref()).await?;

            self.event_sender
                .send_or_log(Event::DiscountRemoved { cart_id: cart.id })
                .await;
        }

        Ok(())
    }

    async fn touch_cart(&self, cart: &CartModel) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.clone().into();
        active.updated_at = Set(Utc::now());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}

/// Input for adding a cart line
#[derive(Debug, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

/// Cart serialized with catalog-fresh prices
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub discount_code: Option<String>,
    pub items: Vec<CartItemResponse>,
    pub subtotal: Decimal,
}

/// A priced cart line as returned to clients
#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_subtotal: Decimal,
}

impl From<PricedLine> for CartItemResponse {
    fn from(line: PricedLine) -> Self {
        Self {
            id: line.line_id,
            product_id: line.product_id,
            variant_id: line.variant_id,
            name: line.name,
            sku: line.sku,
            unit_price: line.unit_price,
            quantity: line.quantity,
            line_subtotal: line.line_subtotal,
        }
    }
}

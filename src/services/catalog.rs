use crate::db::DbPool;
use crate::entities::{
    product, product_variant, Product, ProductModel, ProductVariant, ProductVariantModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Product catalog: products, their variants, and the catalog reads the
/// checkout pipeline re-prices against.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, currency: String) -> Self {
        Self {
            db,
            event_sender,
            currency,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        let product_id = Uuid::new_v4();
        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(product_id),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            currency: Set(self.currency.clone()),
            stock: Set(input.stock.unwrap_or(0)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let product = model.insert(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;

        info!(product_id = %product_id, "Product created");
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductModel, ServiceError> {
        Product::find_by_id(product_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Active products, newest first.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let paginator = Product::find()
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(self.db.as_ref(), per_page.clamp(1, 100));

        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((products, total))
    }

    #[instrument(skip(self, input))]
    pub async fn create_variant(
        &self,
        product_id: Uuid,
        input: CreateVariantInput,
    ) -> Result<ProductVariantModel, ServiceError> {
        self.get_product(product_id).await?;

        let existing = ProductVariant::find()
            .filter(product_variant::Column::Sku.eq(&input.sku))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "SKU '{}' already exists",
                input.sku
            )));
        }

        let variant_id = Uuid::new_v4();
        let now = Utc::now();
        let model = product_variant::ActiveModel {
            id: Set(variant_id),
            product_id: Set(product_id),
            sku: Set(input.sku),
            name: Set(input.name),
            price: Set(input.price),
            stock: Set(input.stock.unwrap_or(0)),
            attributes: Set(input.attributes),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let variant = model.insert(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::VariantCreated {
                product_id,
                variant_id,
            })
            .await;

        info!(product_id = %product_id, variant_id = %variant_id, "Variant created");
        Ok(variant)
    }

    #[instrument(skip(self))]
    pub async fn list_variants(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<ProductVariantModel>, ServiceError> {
        self.get_product(product_id).await?;

        ProductVariant::find()
            .filter(product_variant::Column::ProductId.eq(product_id))
            .order_by_asc(product_variant::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(Into::into)
    }

    /// Catalog read used when re-pricing cart lines: `None` when the product
    /// is missing or has been deactivated, which makes the line droppable.
    pub async fn resolve_active_product(
        &self,
        product_id: Uuid,
    ) -> Result<Option<ProductModel>, ServiceError> {
        Ok(Product::find_by_id(product_id)
            .one(self.db.as_ref())
            .await?
            .filter(|p| p.is_active))
    }

    /// Catalog read used when re-pricing cart lines with a variant.
    pub async fn resolve_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<Option<ProductVariantModel>, ServiceError> {
        Ok(ProductVariant::find_by_id(variant_id)
            .one(self.db.as_ref())
            .await?)
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    /// Starting stock for the no-variant purchase path; omitted means zero.
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
}

/// Input for creating a variant
#[derive(Debug, Deserialize, Validate)]
pub struct CreateVariantInput {
    #[validate(length(min = 1, max = 100))]
    pub sku: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub attributes: Option<serde_json::Value>,
}

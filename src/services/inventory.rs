use crate::db::DbPool;
use crate::entities::{product, product_variant, Product, ProductVariant};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// The stock counter a cart line draws from: the variant row when the line
/// references a variant, the product row otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockTarget {
    Product(Uuid),
    Variant(Uuid),
}

impl StockTarget {
    pub fn for_line(product_id: Uuid, variant_id: Option<Uuid>) -> Self {
        match variant_id {
            Some(id) => Self::Variant(id),
            None => Self::Product(product_id),
        }
    }
}

/// Stock mutations for the catalog.
///
/// Every write is a single conditional UPDATE; the decrement carries its own
/// sufficiency guard so concurrent reservations cannot drive a counter
/// negative. Read-then-write is never used here.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Reserves `quantity` units by decrementing the target's stock, guarded
    /// by `stock >= quantity`. Returns false when the guard did not match
    /// (insufficient stock or missing row).
    #[instrument(skip(self))]
    pub async fn reserve(&self, target: StockTarget, quantity: i32) -> Result<bool, ServiceError> {
        let result = match target {
            StockTarget::Variant(id) => {
                ProductVariant::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).sub(quantity),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product_variant::Column::Id.eq(id))
                    .filter(product_variant::Column::Stock.gte(quantity))
                    .exec(self.db.as_ref())
                    .await?
            }
            StockTarget::Product(id) => {
                Product::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).sub(quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(id))
                    .filter(product::Column::Stock.gte(quantity))
                    .exec(self.db.as_ref())
                    .await?
            }
        };

        let reserved = result.rows_affected > 0;
        debug!(?target, quantity, reserved, "Stock reservation attempted");
        Ok(reserved)
    }

    /// Returns `quantity` units to the target's stock. Returns false when
    /// the row no longer exists (product deleted since the order was
    /// placed); callers log that and move on.
    #[instrument(skip(self))]
    pub async fn restock(&self, target: StockTarget, quantity: i32) -> Result<bool, ServiceError> {
        let result = match target {
            StockTarget::Variant(id) => {
                ProductVariant::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).add(quantity),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product_variant::Column::Id.eq(id))
                    .exec(self.db.as_ref())
                    .await?
            }
            StockTarget::Product(id) => {
                Product::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).add(quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(id))
                    .exec(self.db.as_ref())
                    .await?
            }
        };

        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_with_variant_targets_the_variant_row() {
        let product_id = Uuid::new_v4();
        let variant_id = Uuid::new_v4();

        assert_eq!(
            StockTarget::for_line(product_id, Some(variant_id)),
            StockTarget::Variant(variant_id)
        );
        assert_eq!(
            StockTarget::for_line(product_id, None),
            StockTarget::Product(product_id)
        );
    }
}

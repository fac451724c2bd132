use crate::db::DbPool;
use crate::entities::{discount_code, DiscountCode, DiscountCodeModel};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Discount code management and usage accounting.
///
/// `used_count` moves only through conditional increments and decrements,
/// so the cap holds under concurrent checkouts: racing for the last slot
/// admits exactly one winner.
#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DbPool>,
}

impl DiscountService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_discount(
        &self,
        code: String,
        percent_value: i32,
        usage_limit: i32,
    ) -> Result<DiscountCodeModel, ServiceError> {
        let existing = DiscountCode::find()
            .filter(discount_code::Column::Code.eq(code.as_str()))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Discount code '{}' already exists",
                code
            )));
        }

        let now = Utc::now();
        let model = discount_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            percent_value: Set(percent_value),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(model.insert(self.db.as_ref()).await?)
    }

    pub async fn get_discount(&self, id: Uuid) -> Result<DiscountCodeModel, ServiceError> {
        DiscountCode::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", id)))
    }

    pub async fn find_by_code(&self, code: &str) -> Result<DiscountCodeModel, ServiceError> {
        DiscountCode::find()
            .filter(discount_code::Column::Code.eq(code))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code '{}' not found", code)))
    }

    /// Takes one usage slot: increments `used_count` guarded by
    /// `used_count < usage_limit`. Returns false when the code is exhausted
    /// (or was deleted concurrently).
    #[instrument(skip(self))]
    pub async fn reserve_usage(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = DiscountCode::update_many()
            .col_expr(
                discount_code::Column::UsedCount,
                Expr::col(discount_code::Column::UsedCount).add(1),
            )
            .col_expr(discount_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(discount_code::Column::Id.eq(id))
            .filter(
                Expr::col(discount_code::Column::UsedCount)
                    .lt(Expr::col(discount_code::Column::UsageLimit)),
            )
            .exec(self.db.as_ref())
            .await?;

        let reserved = result.rows_affected > 0;
        debug!(discount_code_id = %id, reserved, "Discount usage reservation attempted");
        Ok(reserved)
    }

    /// Gives a usage slot back: decrements `used_count` guarded by
    /// `used_count > 0`, so the counter never goes below zero.
    #[instrument(skip(self))]
    pub async fn release_usage(&self, id: Uuid) -> Result<bool, ServiceError> {
        let result = DiscountCode::update_many()
            .col_expr(
                discount_code::Column::UsedCount,
                Expr::col(discount_code::Column::UsedCount).sub(1),
            )
            .col_expr(discount_code::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(discount_code::Column::Id.eq(id))
            .filter(discount_code::Column::UsedCount.gt(0))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected > 0)
    }
}

use crate::db::DbPool;
use crate::entities::{customer, Customer};
use crate::errors::ServiceError;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Loyalty account balance accounting.
///
/// The balance lives on `customers.loyalty_points` and only moves through
/// single-statement conditional updates; the debit guard keeps it from ever
/// going negative, whatever the interleaving.
#[derive(Clone)]
pub struct LoyaltyService {
    db: Arc<DbPool>,
}

impl LoyaltyService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Applies the order's net points movement in one conditional UPDATE:
    /// `loyalty_points = loyalty_points - spent + granted` guarded by
    /// `loyalty_points >= spent`. Runs on the caller's connection so checkout
    /// can place it inside the order transaction. Returns false when the
    /// guard did not match (balance dropped below `spent` concurrently).
    #[instrument(skip(self, conn))]
    pub async fn settle_points<C: ConnectionTrait>(
        &self,
        conn: &C,
        customer_id: Uuid,
        points_spent: i32,
        points_granted: i32,
    ) -> Result<bool, ServiceError> {
        let result = Customer::update_many()
            .col_expr(
                customer::Column::LoyaltyPoints,
                Expr::col(customer::Column::LoyaltyPoints)
                    .sub(points_spent)
                    .add(points_granted),
            )
            .col_expr(customer::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(customer::Column::Id.eq(customer_id))
            .filter(customer::Column::LoyaltyPoints.gte(points_spent))
            .exec(conn)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Reverses an order's points movement on cancellation. The net amount
    /// is `points_spent - points_granted`: spent points come back, granted
    /// points are clawed back. A claw-back that no longer fits the balance
    /// clamps it at zero instead of going negative.
    #[instrument(skip(self))]
    pub async fn restore_on_cancel(
        &self,
        customer_id: Uuid,
        points_spent: i32,
        points_granted: i32,
    ) -> Result<(), ServiceError> {
        let net = points_spent - points_granted;

        if net > 0 {
            let result = Customer::update_many()
                .col_expr(
                    customer::Column::LoyaltyPoints,
                    Expr::col(customer::Column::LoyaltyPoints).add(net),
                )
                .col_expr(customer::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(customer::Column::Id.eq(customer_id))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 0 {
                warn!(
                    customer_id = %customer_id,
                    net,
                    "Points restitution target customer no longer exists"
                );
            }
        } else if net < 0 {
            let claw_back = -net;
            let result = Customer::update_many()
                .col_expr(
                    customer::Column::LoyaltyPoints,
                    Expr::col(customer::Column::LoyaltyPoints).sub(claw_back),
                )
                .col_expr(customer::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(customer::Column::Id.eq(customer_id))
                .filter(customer::Column::LoyaltyPoints.gte(claw_back))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 0 {
                // Granted points were already spent; zero the balance rather
                // than drive it negative.
                warn!(
                    customer_id = %customer_id,
                    claw_back,
                    "Balance below claw-back amount, clamping at zero"
                );
                Customer::update_many()
                    .col_expr(customer::Column::LoyaltyPoints, Expr::value(0))
                    .col_expr(customer::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(customer::Column::Id.eq(customer_id))
                    .filter(customer::Column::LoyaltyPoints.lt(claw_back))
                    .exec(self.db.as_ref())
                    .await?;
            }
        }

        Ok(())
    }
}

use crate::entities::{CartItemModel, ProductModel, ProductVariantModel};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// One loyalty point is worth this many currency units when spent.
pub const CURRENCY_UNITS_PER_POINT: i64 = 1000;

fn point_value() -> Decimal {
    Decimal::from(CURRENCY_UNITS_PER_POINT)
}

/// Fraction of the final total granted back as points (10%).
fn earn_rate() -> Decimal {
    Decimal::new(10, 2)
}

/// A cart line re-priced against the live catalog.
///
/// Carries the frozen values an order line snapshot needs; nothing here
/// refers back to the catalog row it came from.
#[derive(Debug, Clone, Serialize)]
pub struct PricedLine {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub sku: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_subtotal: Decimal,
}

impl PricedLine {
    /// Prices a cart line. Unit price is the variant price when the line
    /// references a variant, else the product base price.
    pub fn from_catalog(
        line: &CartItemModel,
        product: &ProductModel,
        variant: Option<&ProductVariantModel>,
    ) -> Self {
        let unit_price = variant.map(|v| v.price).unwrap_or(product.price);
        let quantity = line.quantity;

        Self {
            line_id: line.id,
            product_id: product.id,
            variant_id: variant.map(|v| v.id),
            name: product.name.clone(),
            sku: variant.map(|v| v.sku.clone()),
            unit_price,
            quantity,
            line_subtotal: unit_price * Decimal::from(quantity),
        }
    }
}

/// Sum of the line subtotals.
pub fn subtotal(lines: &[PricedLine]) -> Decimal {
    lines.iter().map(|l| l.line_subtotal).sum()
}

/// Percentage discount applied to the subtotal.
pub fn discount_amount(subtotal: Decimal, percent_value: i32) -> Decimal {
    subtotal * Decimal::from(percent_value) / Decimal::from(100)
}

/// Clamps a points-spend request to what the order and the balance allow:
/// `min(requested, ceil(total / 1000), balance)`.
pub fn clamp_points_to_spend(requested: i32, total: Decimal, balance: i32) -> i32 {
    if requested <= 0 {
        return 0;
    }

    let order_cap = (total / point_value()).ceil().to_i32().unwrap_or(i32::MAX);

    requested.min(order_cap).min(balance.max(0))
}

/// Deducts the monetary value of spent points, flooring at zero.
pub fn apply_points(total: Decimal, points_spent: i32) -> Decimal {
    let deduction = Decimal::from(points_spent) * point_value();
    (total - deduction).max(Decimal::ZERO)
}

/// Points granted for an order: `floor(total * 0.10 / 1000)`, computed on
/// the final (post-discount, post-points) total.
pub fn points_earned(total: Decimal) -> i32 {
    (total * earn_rate() / point_value())
        .floor()
        .to_i32()
        .unwrap_or(i32::MAX)
}

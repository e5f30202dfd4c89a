//! Order placement: the one transaction where stock correctness matters.
//!
//! Products are locked with `SELECT ... FOR UPDATE` before the stock check so
//! two concurrent checkouts cannot both pass on the same last unit. Any check
//! failure aborts the whole transaction: no partial order, no partial
//! decrement.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Order, OrderItem, Product};

/// Normalized line-item shape accepted at the API boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Folds duplicate product ids into one line so the stock check sees the
/// total requested quantity. Rejects empty input and non-positive quantities.
/// Output is sorted by product id so concurrent placements take their row
/// locks in a consistent order.
pub fn normalize_lines(lines: &[OrderLine]) -> Result<Vec<OrderLine>, ApiError> {
    if lines.is_empty() {
        return Err(ApiError::Validation("No order items".to_string()));
    }
    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 {
            return Err(ApiError::Validation("Quantity must be at least 1".to_string()));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| ApiError::Validation("Quantity out of range".to_string()))?;
            }
            None => merged.push(*line),
        }
    }
    merged.sort_by_key(|l| l.product_id);
    Ok(merged)
}

/// Atomically converts line items into a persisted order: lock and check
/// stock for every product, insert the order with its snapshots, decrement
/// stock, commit.
pub async fn place_order(
    db: &PgPool,
    customer_id: Uuid,
    lines: &[OrderLine],
    shipping_address: &serde_json::Value,
    payment_result: &serde_json::Value,
    total_price: Decimal,
) -> Result<PlacedOrder, ApiError> {
    let lines = normalize_lines(lines)?;
    let mut tx = db.begin().await?;

    let mut products = Vec::with_capacity(lines.len());
    for line in &lines {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(line.product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ApiError::ProductNotFound(line.product_id.to_string()))?;
        if product.stock < line.quantity {
            return Err(ApiError::InsufficientStock(product.name));
        }
        products.push(product);
    }

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, customer_id, shipping_address, payment_result, total_price) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(customer_id)
    .bind(shipping_address)
    .bind(payment_result)
    .bind(total_price)
    .fetch_one(&mut *tx)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (line, product) in lines.iter().zip(&products) {
        let item = sqlx::query_as::<_, OrderItem>(
            "INSERT INTO order_items (id, order_id, product_id, name, price, image, quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(order.id)
        .bind(product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.images.first().cloned().unwrap_or_default())
        .bind(line.quantity)
        .fetch_one(&mut *tx)
        .await?;
        items.push(item);

        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1")
            .bind(product.id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!(order_id = %order.id, customer_id = %customer_id, total = %order.total_price, "order placed");
    Ok(PlacedOrder { order, items })
}

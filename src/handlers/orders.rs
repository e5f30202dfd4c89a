//! Customer-facing order endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthCustomer;
use crate::checkout::{self, OrderLine};
use crate::error::ApiError;
use crate::models::{Order, OrderItem, Product, Review};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLine>,
    pub shipping_address: serde_json::Value,
    #[serde(default)]
    pub payment_result: Option<serde_json::Value>,
    pub total_price: Decimal,
}

pub async fn create_order(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let payment_result = req.payment_result.unwrap_or_else(|| serde_json::json!({}));
    let placed = checkout::place_order(
        &state.db,
        customer.id,
        &req.items,
        &req.shipping_address,
        &payment_result,
        req.total_price,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Order created successfully", "order": placed })),
    ))
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemView>,
    pub has_reviewed: bool,
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: Option<Product>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC",
    )
    .bind(customer.id)
    .fetch_all(&state.db)
    .await?;

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ANY($1)")
        .bind(&order_ids)
        .fetch_all(&state.db)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
        .bind(&product_ids)
        .fetch_all(&state.db)
        .await?;

    let reviews = sqlx::query_as::<_, Review>(
        "SELECT * FROM reviews WHERE order_id = ANY($1) AND customer_id = $2",
    )
    .bind(&order_ids)
    .bind(customer.id)
    .fetch_all(&state.db)
    .await?;

    let views: Vec<OrderView> = orders
        .into_iter()
        .map(|order| {
            let order_items = items
                .iter()
                .filter(|i| i.order_id == order.id)
                .map(|i| OrderItemView {
                    item: i.clone(),
                    product: products.iter().find(|p| p.id == i.product_id).cloned(),
                })
                .collect();
            let has_reviewed = reviews.iter().any(|r| r.order_id == order.id);
            OrderView { order, items: order_items, has_reviewed }
        })
        .collect();

    Ok(Json(serde_json::json!({ "orders": views })))
}

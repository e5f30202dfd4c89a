//! Admin surface: catalog management, order fulfillment, customers, stats.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AdminCustomer;
use crate::error::ApiError;
use crate::models::{Customer, Order, OrderItem, OrderStatus, Product};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    #[validate(length(min = 1))]
    pub category: String,
    /// Public URLs; image hosting is handled by the external media service.
    #[validate(length(min = 1, max = 3))]
    pub images: Vec<String>,
}

pub async fn create_product(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    req.validate()
        .map_err(|_| ApiError::Validation("All fields and 1-3 images are required".to_string()))?;
    if req.price <= Decimal::ZERO || req.stock < 0 {
        return Err(ApiError::Validation("Price and stock must be positive".to_string()));
    }

    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, name, description, price, stock, category, images) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock)
    .bind(&req.category)
    .bind(&req.images)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn list_products(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(products))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub stock: Option<i32>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
}

pub async fn update_product(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProductRequest>,
) -> Result<Json<Product>, ApiError> {
    if let Some(images) = &req.images {
        if images.is_empty() || images.len() > 3 {
            return Err(ApiError::Validation("Maximum 3 images allowed".to_string()));
        }
    }
    if matches!(req.price, Some(p) if p <= Decimal::ZERO) || matches!(req.stock, Some(s) if s < 0) {
        return Err(ApiError::Validation("Price and stock must be positive".to_string()));
    }

    sqlx::query_as::<_, Product>(
        "UPDATE products SET \
             name = COALESCE($2, name), description = COALESCE($3, description), \
             price = COALESCE($4, price), stock = COALESCE($5, stock), \
             category = COALESCE($6, category), images = COALESCE($7, images), \
             updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.stock)
    .bind(&req.category)
    .bind(&req.images)
    .fetch_optional(&state.db)
    .await?
    .map(Json)
    .ok_or(ApiError::NotFound("Product"))
}

pub async fn delete_product(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("Product"));
    }
    Ok(Json(serde_json::json!({ "message": "Product deleted successfully" })))
}

#[derive(Debug, Serialize)]
pub struct AdminOrderView {
    #[serde(flatten)]
    pub order: Order,
    pub customer: CustomerSummary,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize)]
pub struct CustomerSummary {
    pub name: String,
    pub email: String,
}

pub async fn list_orders(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = ANY($1)")
        .bind(&order_ids)
        .fetch_all(&state.db)
        .await?;

    let customer_ids: Vec<Uuid> = orders.iter().map(|o| o.customer_id).collect();
    let customers = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ANY($1)")
        .bind(&customer_ids)
        .fetch_all(&state.db)
        .await?;

    let views: Vec<AdminOrderView> = orders
        .into_iter()
        .map(|order| {
            let customer = customers
                .iter()
                .find(|c| c.id == order.customer_id)
                .map(|c| CustomerSummary { name: c.name.clone(), email: c.email.clone() })
                .unwrap_or(CustomerSummary { name: String::new(), email: String::new() });
            let order_items = items.iter().filter(|i| i.order_id == order.id).cloned().collect();
            AdminOrderView { order, customer, items: order_items }
        })
        .collect();

    Ok(Json(serde_json::json!({ "orders": views })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

pub async fn update_order_status(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = OrderStatus::parse(&req.status).ok_or(ApiError::InvalidStatus)?;

    // Transition timestamps are set once, on the first application only;
    // re-applying a status leaves them untouched.
    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET \
             status = $2, \
             shipped_at = CASE WHEN $2 = 'SHIPPED' AND shipped_at IS NULL THEN NOW() ELSE shipped_at END, \
             delivered_at = CASE WHEN $2 = 'DELIVERED' AND delivered_at IS NULL THEN NOW() ELSE delivered_at END, \
             updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(order_id)
    .bind(status.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Order"))?;

    Ok(Json(serde_json::json!({ "message": "Order status updated successfully", "order": order })))
}

pub async fn list_customers(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let customers = sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(serde_json::json!({ "customers": customers })))
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
    AdminCustomer(_): AdminCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let total_orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.db)
        .await?;
    let total_revenue: Decimal =
        sqlx::query_scalar("SELECT COALESCE(SUM(total_price), 0) FROM orders")
            .fetch_one(&state.db)
            .await?;
    let total_customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&state.db)
        .await?;
    let total_products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
        .fetch_one(&state.db)
        .await?;

    Ok(Json(serde_json::json!({
        "total_revenue": total_revenue,
        "total_orders": total_orders,
        "total_customers": total_customers,
        "total_products": total_products,
    })))
}

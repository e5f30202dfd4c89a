//! Cart management. One cart per customer, created lazily on first read;
//! stock is checked on every mutation but only decremented at checkout.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthCustomer;
use crate::error::ApiError;
use crate::models::{Cart, Product};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub items: Vec<CartLineView>,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub id: Uuid,
    pub quantity: i32,
    pub product: Product,
}

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    id: Uuid,
    product_id: Uuid,
    quantity: i32,
}

async fn find_cart(db: &PgPool, customer_id: Uuid) -> Result<Option<Cart>, ApiError> {
    let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(db)
        .await?;
    Ok(cart)
}

async fn load_or_create_cart(db: &PgPool, customer_id: Uuid) -> Result<Cart, ApiError> {
    sqlx::query("INSERT INTO carts (id, customer_id) VALUES ($1, $2) ON CONFLICT (customer_id) DO NOTHING")
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .execute(db)
        .await?;
    let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(db)
        .await?;
    Ok(cart)
}

async fn cart_view(db: &PgPool, cart: &Cart) -> Result<CartView, ApiError> {
    let rows = sqlx::query_as::<_, CartLineRow>(
        "SELECT id, product_id, quantity FROM cart_items WHERE cart_id = $1 ORDER BY created_at",
    )
    .bind(cart.id)
    .fetch_all(db)
    .await?;

    let ids: Vec<Uuid> = rows.iter().map(|r| r.product_id).collect();
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(db)
        .await?;

    let items = rows
        .into_iter()
        .filter_map(|row| {
            products
                .iter()
                .find(|p| p.id == row.product_id)
                .map(|p| CartLineView { id: row.id, quantity: row.quantity, product: p.clone() })
        })
        .collect();

    Ok(CartView { id: cart.id, customer_id: cart.customer_id, items })
}

pub async fn get_cart(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cart = load_or_create_cart(&state.db, customer.id).await?;
    let view = cart_view(&state.db, &cart).await?;
    Ok(Json(serde_json::json!({ "cart": view })))
}

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    pub quantity: Option<i32>,
}

pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Json(req): Json<AddToCartRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let quantity = req.quantity.unwrap_or(1);
    if quantity < 1 {
        return Err(ApiError::Validation("Quantity must be at least 1".to_string()));
    }

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(req.product_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Product"))?;
    if product.stock < quantity {
        return Err(ApiError::InsufficientStock(product.name.clone()));
    }

    let cart = load_or_create_cart(&state.db, customer.id).await?;

    let existing = sqlx::query_as::<_, CartLineRow>(
        "SELECT id, product_id, quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart.id)
    .bind(req.product_id)
    .fetch_optional(&state.db)
    .await?;

    match existing {
        Some(item) => {
            // Re-adding an existing line bumps it by exactly one, whatever
            // quantity the request carried.
            let new_quantity = item.quantity + 1;
            if product.stock < new_quantity {
                return Err(ApiError::InsufficientStock(product.name));
            }
            sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
                .bind(item.id)
                .bind(new_quantity)
                .execute(&state.db)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO cart_items (id, cart_id, product_id, quantity) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::new_v4())
            .bind(cart.id)
            .bind(req.product_id)
            .bind(quantity)
            .execute(&state.db)
            .await?;
        }
    }

    let view = cart_view(&state.db, &cart).await?;
    Ok(Json(serde_json::json!({ "message": "Item added to cart", "cart": view })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Path(product_id): Path<Uuid>,
    Json(req): Json<UpdateCartItemRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.quantity < 1 {
        return Err(ApiError::Validation("Quantity must be at least 1".to_string()));
    }

    let cart = find_cart(&state.db, customer.id).await?.ok_or(ApiError::NotFound("Cart"))?;

    let item = sqlx::query_as::<_, CartLineRow>(
        "SELECT id, product_id, quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart.id)
    .bind(product_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(ApiError::NotFound("Cart item"))?;

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Product"))?;
    if product.stock < req.quantity {
        return Err(ApiError::InsufficientStock(product.name));
    }

    sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
        .bind(item.id)
        .bind(req.quantity)
        .execute(&state.db)
        .await?;

    let view = cart_view(&state.db, &cart).await?;
    Ok(Json(serde_json::json!({ "message": "Cart updated successfully", "cart": view })))
}

pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Path(product_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cart = find_cart(&state.db, customer.id).await?.ok_or(ApiError::NotFound("Cart"))?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
        .bind(cart.id)
        .bind(product_id)
        .execute(&state.db)
        .await?;

    let view = cart_view(&state.db, &cart).await?;
    Ok(Json(serde_json::json!({ "message": "Item removed from cart", "cart": view })))
}

pub async fn clear_cart(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let cart = find_cart(&state.db, customer.id).await?.ok_or(ApiError::NotFound("Cart"))?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart.id)
        .execute(&state.db)
        .await?;

    let view = cart_view(&state.db, &cart).await?;
    Ok(Json(serde_json::json!({ "message": "Cart cleared", "cart": view })))
}

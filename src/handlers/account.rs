//! Customer profile, address book, and wishlist.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthCustomer;
use crate::error::ApiError;
use crate::models::{Address, Product};
use crate::AppState;

pub async fn get_me(AuthCustomer(customer): AuthCustomer) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": customer.id,
        "subject": customer.subject,
        "email": customer.email,
        "name": customer.name,
        "image_url": customer.image_url,
        "created_at": customer.created_at,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressPayload {
    pub label: Option<String>,
    #[validate(length(min = 1))]
    pub full_name: String,
    #[validate(length(min = 1))]
    pub street_address: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub state: String,
    #[validate(length(min = 1))]
    pub zip_code: String,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

async fn list_for(db: &PgPool, customer_id: Uuid) -> Result<Vec<Address>, ApiError> {
    let addresses = sqlx::query_as::<_, Address>(
        "SELECT * FROM addresses WHERE customer_id = $1 ORDER BY created_at",
    )
    .bind(customer_id)
    .fetch_all(db)
    .await?;
    Ok(addresses)
}

pub async fn add_address(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Json(req): Json<AddressPayload>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    req.validate()
        .map_err(|_| ApiError::Validation("Missing required address fields".to_string()))?;

    // Default flag is exclusive per customer; clearing the others and
    // inserting happen in one transaction.
    let mut tx = state.db.begin().await?;
    if req.is_default {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE customer_id = $1")
            .bind(customer.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        "INSERT INTO addresses (id, customer_id, label, full_name, street_address, city, state, zip_code, phone_number, is_default) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(Uuid::new_v4())
    .bind(customer.id)
    .bind(&req.label)
    .bind(&req.full_name)
    .bind(&req.street_address)
    .bind(&req.city)
    .bind(&req.state)
    .bind(&req.zip_code)
    .bind(&req.phone_number)
    .bind(req.is_default)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let addresses = list_for(&state.db, customer.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Address added successfully", "addresses": addresses })),
    ))
}

pub async fn get_addresses(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let addresses = list_for(&state.db, customer.id).await?;
    Ok(Json(serde_json::json!({ "addresses": addresses })))
}

pub async fn update_address(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Path(address_id): Path<Uuid>,
    Json(req): Json<AddressPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    req.validate()
        .map_err(|_| ApiError::Validation("Missing required address fields".to_string()))?;

    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM addresses WHERE id = $1 AND customer_id = $2")
            .bind(address_id)
            .bind(customer.id)
            .fetch_optional(&state.db)
            .await?;
    if existing.is_none() {
        return Err(ApiError::NotFound("Address"));
    }

    let mut tx = state.db.begin().await?;
    if req.is_default {
        sqlx::query("UPDATE addresses SET is_default = FALSE WHERE customer_id = $1")
            .bind(customer.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        "UPDATE addresses SET label = $2, full_name = $3, street_address = $4, city = $5, \
         state = $6, zip_code = $7, phone_number = $8, is_default = $9 WHERE id = $1",
    )
    .bind(address_id)
    .bind(&req.label)
    .bind(&req.full_name)
    .bind(&req.street_address)
    .bind(&req.city)
    .bind(&req.state)
    .bind(&req.zip_code)
    .bind(&req.phone_number)
    .bind(req.is_default)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let addresses = list_for(&state.db, customer.id).await?;
    Ok(Json(serde_json::json!({ "message": "Address updated successfully", "addresses": addresses })))
}

pub async fn delete_address(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Path(address_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let result = sqlx::query("DELETE FROM addresses WHERE id = $1 AND customer_id = $2")
        .bind(address_id)
        .bind(customer.id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Address"));
    }

    let addresses = list_for(&state.db, customer.id).await?;
    Ok(Json(serde_json::json!({ "message": "Address deleted successfully", "addresses": addresses })))
}

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    pub product_id: Uuid,
}

async fn wishlist_for(db: &PgPool, customer_id: Uuid) -> Result<Vec<Product>, ApiError> {
    let products = sqlx::query_as::<_, Product>(
        "SELECT p.* FROM products p \
         JOIN wishlist_items w ON w.product_id = p.id \
         WHERE w.customer_id = $1 ORDER BY w.created_at DESC",
    )
    .bind(customer_id)
    .fetch_all(db)
    .await?;
    Ok(products)
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Json(req): Json<WishlistRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let product: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1")
        .bind(req.product_id)
        .fetch_optional(&state.db)
        .await?;
    if product.is_none() {
        return Err(ApiError::NotFound("Product"));
    }

    let inserted = sqlx::query(
        "INSERT INTO wishlist_items (customer_id, product_id) VALUES ($1, $2) \
         ON CONFLICT (customer_id, product_id) DO NOTHING",
    )
    .bind(customer.id)
    .bind(req.product_id)
    .execute(&state.db)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(ApiError::Validation("Product already in wishlist".to_string()));
    }

    let wishlist = wishlist_for(&state.db, customer.id).await?;
    Ok(Json(serde_json::json!({ "message": "Product added to wishlist", "wishlist": wishlist })))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Path(product_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = sqlx::query("DELETE FROM wishlist_items WHERE customer_id = $1 AND product_id = $2")
        .bind(customer.id)
        .bind(product_id)
        .execute(&state.db)
        .await?;
    if removed.rows_affected() == 0 {
        return Err(ApiError::Validation("Product not found in wishlist".to_string()));
    }

    let wishlist = wishlist_for(&state.db, customer.id).await?;
    Ok(Json(serde_json::json!({ "message": "Product removed from wishlist", "wishlist": wishlist })))
}

pub async fn get_wishlist(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
) -> Result<Json<serde_json::Value>, ApiError> {
    let wishlist = wishlist_for(&state.db, customer.id).await?;
    Ok(Json(serde_json::json!({ "wishlist": wishlist })))
}

//! Public catalog reads.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::AuthCustomer;
use crate::error::ApiError;
use crate::models::Product;
use crate::AppState;

pub async fn list_products(
    State(state): State<AppState>,
    AuthCustomer(_): AuthCustomer,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(products))
}

pub async fn get_product(
    State(state): State<AppState>,
    AuthCustomer(_): AuthCustomer,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Product"))
}

//! Review submission and deletion, with rating aggregates recomputed in the
//! same transaction as the write.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::auth::AuthCustomer;
use crate::error::ApiError;
use crate::models::{Order, OrderStatus, Review};
use crate::AppState;

/// Recomputes the exact mean and count over all surviving reviews; an
/// incremental update would drift after deletions.
async fn recompute_rating(tx: &mut Transaction<'_, Postgres>, product_id: Uuid) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE products SET \
             average_rating = COALESCE((SELECT AVG(rating)::float8 FROM reviews WHERE product_id = $1), 0), \
             total_reviews = (SELECT COUNT(*) FROM reviews WHERE product_id = $1)::int, \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(product_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub product_id: Uuid,
    pub order_id: Uuid,
    pub rating: i32,
}

pub async fn create_review(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::InvalidRating);
    }

    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(req.order_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Order"))?;

    if order.customer_id != customer.id {
        return Err(ApiError::Forbidden("Not authorized to review this order"));
    }
    if OrderStatus::parse(&order.status) != Some(OrderStatus::Delivered) {
        return Err(ApiError::OrderNotEligible);
    }

    let in_order: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM order_items WHERE order_id = $1 AND product_id = $2")
            .bind(req.order_id)
            .bind(req.product_id)
            .fetch_optional(&state.db)
            .await?;
    if in_order.is_none() {
        return Err(ApiError::ProductNotInOrder);
    }

    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM reviews WHERE product_id = $1 AND customer_id = $2")
            .bind(req.product_id)
            .bind(customer.id)
            .fetch_optional(&state.db)
            .await?;
    if existing.is_some() {
        return Err(ApiError::AlreadyReviewed);
    }

    let mut tx = state.db.begin().await?;
    let review = sqlx::query_as::<_, Review>(
        "INSERT INTO reviews (id, product_id, customer_id, order_id, rating) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(req.product_id)
    .bind(customer.id)
    .bind(req.order_id)
    .bind(req.rating)
    .fetch_one(&mut *tx)
    .await?;
    recompute_rating(&mut tx, req.product_id).await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "message": "Review submitted successfully", "review": review })),
    ))
}

pub async fn delete_review(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Path(review_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let review = sqlx::query_as::<_, Review>("SELECT * FROM reviews WHERE id = $1")
        .bind(review_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(ApiError::NotFound("Review"))?;

    if review.customer_id != customer.id {
        return Err(ApiError::Forbidden("Not authorized to delete this review"));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM reviews WHERE id = $1")
        .bind(review_id)
        .execute(&mut *tx)
        .await?;
    recompute_rating(&mut tx, review.product_id).await?;
    tx.commit().await?;

    Ok(Json(serde_json::json!({ "message": "Review deleted successfully" })))
}

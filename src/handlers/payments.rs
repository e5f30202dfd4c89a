//! Checkout intent creation and signature-gated order finalization.
//!
//! Intent creation is stateless: nothing is persisted until the gateway
//! signature checks out, at which point the placement transaction runs.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthCustomer;
use crate::checkout::{self, OrderLine};
use crate::error::ApiError;
use crate::models::Product;
use crate::pricing;
use crate::AppState;

async fn price_lines(
    db: &sqlx::PgPool,
    lines: &[OrderLine],
) -> Result<pricing::Quote, ApiError> {
    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(db)
        .await?;

    let mut priced = Vec::with_capacity(lines.len());
    for line in lines {
        let product = products
            .iter()
            .find(|p| p.id == line.product_id)
            .ok_or_else(|| ApiError::ProductNotFound(line.product_id.to_string()))?;
        priced.push((product.price, line.quantity));
    }
    Ok(pricing::quote(priced))
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentOrderRequest {
    pub cart_items: Vec<OrderLine>,
    // Defaults to null so an omitted address reaches the explicit check
    // below instead of failing body extraction.
    #[serde(default)]
    pub shipping_address: serde_json::Value,
}

pub async fn create_payment_order(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Json(req): Json<CreatePaymentOrderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lines = checkout::normalize_lines(&req.cart_items)?;
    if req.shipping_address.is_null() {
        return Err(ApiError::Validation("Shipping address is required".to_string()));
    }

    let quote = price_lines(&state.db, &lines).await?;
    let amount_minor = pricing::to_minor_units(quote.total)
        .ok_or_else(|| ApiError::Validation("Order total out of range".to_string()))?;

    let receipt = format!("rcpt_{}_{}", Utc::now().timestamp_millis(), customer.id.simple());
    let gateway_order = state.gateway.create_order(amount_minor, &receipt).await?;
    tracing::info!(order_id = %gateway_order.id, amount = amount_minor, "payment intent created");

    // Cart contents and totals are echoed back so the client can return them
    // verbatim at verification time.
    Ok(Json(serde_json::json!({
        "order_id": gateway_order.id,
        "amount": gateway_order.amount,
        "currency": gateway_order.currency,
        "key_id": state.gateway.key_id(),
        "customer": { "name": customer.name, "email": customer.email },
        "cart_items": lines,
        "shipping_address": req.shipping_address,
        "subtotal": quote.subtotal,
        "shipping": quote.shipping,
        "tax": quote.tax,
        "total_amount": quote.total,
    })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
    pub cart_items: Vec<OrderLine>,
    pub shipping_address: serde_json::Value,
    pub total_amount: Decimal,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    AuthCustomer(customer): AuthCustomer,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.gateway.verify_signature(
        &req.gateway_order_id,
        &req.gateway_payment_id,
        &req.gateway_signature,
    ) {
        return Err(ApiError::InvalidSignature);
    }

    // The echoed total is kept as the receipt total, but a divergence from
    // the server-side recomputation is worth noticing.
    let lines = checkout::normalize_lines(&req.cart_items)?;
    if let Ok(quote) = price_lines(&state.db, &lines).await {
        if quote.total != req.total_amount {
            tracing::warn!(
                gateway_order_id = %req.gateway_order_id,
                echoed = %req.total_amount,
                recomputed = %quote.total,
                "verified payment total differs from server-side recomputation"
            );
        }
    }

    let payment_result = serde_json::json!({
        "gateway_order_id": req.gateway_order_id,
        "gateway_payment_id": req.gateway_payment_id,
        "gateway_signature": req.gateway_signature,
        "status": "completed",
    });

    let placed = checkout::place_order(
        &state.db,
        customer.id,
        &lines,
        &req.shipping_address,
        &payment_result,
        req.total_amount,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Payment verified and order created successfully",
        "order": placed,
    })))
}

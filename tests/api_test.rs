//! Database-backed API tests.
//!
//! Each test gets its own freshly migrated database from `#[sqlx::test]`
//! (`DATABASE_URL` must point at a reachable Postgres server) and drives the
//! full router, so identity resolution, handlers, and the transactions they
//! wrap are all exercised end to end. Signature checks are local HMAC, so the
//! payment verification paths run without a gateway.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use storefront::config::{Config, GatewayConfig};
use storefront::gateway::PaymentGateway;
use storefront::{router, AppState};

const KEY_SECRET: &str = "test_key_secret";
const SHOPPER: (&str, &str) = ("user_shopper", "shopper@example.com");
const ADMIN: (&str, &str) = ("user_admin", "admin@example.com");

fn app(pool: PgPool) -> Router {
    let config = Config {
        database_url: String::new(),
        port: 0,
        admin_email: ADMIN.1.to_string(),
        cors_origin: None,
        gateway: GatewayConfig {
            base_url: "http://localhost:9".into(),
            key_id: "key_test".into(),
            key_secret: KEY_SECRET.into(),
            currency: "INR".into(),
        },
    };
    router(AppState {
        db: pool,
        gateway: Arc::new(PaymentGateway::new(&config.gateway)),
        config: Arc::new(config),
    })
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    identity: (&str, &str),
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-auth-subject", identity.0)
        .header("x-auth-email", identity.1)
        .header("x-auth-name", "Test User");
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

async fn seed_product(pool: &PgPool, name: &str, price: &str, stock: i32) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO products (id, name, description, price, stock, category, images) \
         VALUES ($1, $2, 'seeded', $3::numeric, $4, 'misc', ARRAY['https://img.example/1.png'])",
    )
    .bind(id)
    .bind(name)
    .bind(price)
    .bind(stock)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn stock_of(pool: &PgPool, id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn rating_of(pool: &PgPool, id: Uuid) -> (f64, i32) {
    sqlx::query_as("SELECT average_rating, total_reviews FROM products WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn order_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(pool).await.unwrap()
}

/// Places an order for one unit of `product_id` and marks it DELIVERED.
async fn place_delivered_order(app: &Router, product_id: Uuid) -> Uuid {
    let (status, body) = request(
        app,
        "POST",
        "/api/orders",
        SHOPPER,
        Some(json!({
            "items": [{ "product_id": product_id, "quantity": 1 }],
            "shipping_address": { "city": "London" },
            "total_price": "25.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id: Uuid = body["order"]["id"].as_str().unwrap().parse().unwrap();

    let (status, _) = request(
        app,
        "PATCH",
        &format!("/api/admin/orders/{order_id}/status"),
        ADMIN,
        Some(json!({ "status": "DELIVERED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    order_id
}

fn sign(order_id: &str, payment_id: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(KEY_SECRET.as_bytes()).unwrap();
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[sqlx::test]
async fn aborted_order_leaves_no_partial_stock_decrement(pool: PgPool) {
    let app = app(pool.clone());
    let plenty = seed_product(&pool, "Widget", "10.00", 5).await;
    let scarce = seed_product(&pool, "Gadget", "20.00", 2).await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/orders",
        SHOPPER,
        Some(json!({
            "items": [
                { "product_id": plenty, "quantity": 2 },
                { "product_id": scarce, "quantity": 3 },
            ],
            "shipping_address": { "city": "London" },
            "total_price": "80.00",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Insufficient stock"));
    assert_eq!(stock_of(&pool, plenty).await, 5);
    assert_eq!(stock_of(&pool, scarce).await, 2);
    assert_eq!(order_count(&pool).await, 0);
}

#[sqlx::test]
async fn empty_order_is_rejected(pool: PgPool) {
    let app = app(pool.clone());
    let (status, _) = request(
        &app,
        "POST",
        "/api/orders",
        SHOPPER,
        Some(json!({
            "items": [],
            "shipping_address": { "city": "London" },
            "total_price": "0.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(order_count(&pool).await, 0);
}

#[sqlx::test]
async fn successful_order_decrements_each_product_and_snapshots_items(pool: PgPool) {
    let app = app(pool.clone());
    let first = seed_product(&pool, "Widget", "10.00", 5).await;
    let second = seed_product(&pool, "Gadget", "20.00", 2).await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/orders",
        SHOPPER,
        Some(json!({
            "items": [
                { "product_id": first, "quantity": 2 },
                { "product_id": second, "quantity": 1 },
            ],
            "shipping_address": { "city": "London" },
            "total_price": "53.20",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stock_of(&pool, first).await, 3);
    assert_eq!(stock_of(&pool, second).await, 1);

    // Renaming the product must not alter the historical snapshot.
    let order_id: Uuid = body["order"]["id"].as_str().unwrap().parse().unwrap();
    sqlx::query("UPDATE products SET name = 'Renamed' WHERE id = $1")
        .bind(first)
        .execute(&pool)
        .await
        .unwrap();
    let snapshot: String =
        sqlx::query_scalar("SELECT name FROM order_items WHERE order_id = $1 AND product_id = $2")
            .bind(order_id)
            .bind(first)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(snapshot, "Widget");
}

#[sqlx::test]
async fn adding_an_existing_cart_item_increments_by_one(pool: PgPool) {
    let app = app(pool.clone());
    let product = seed_product(&pool, "Widget", "10.00", 5).await;
    let add = json!({ "product_id": product, "quantity": 1 });

    let (status, _) = request(&app, "POST", "/api/cart", SHOPPER, Some(add.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(&app, "POST", "/api/cart", SHOPPER, Some(add.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&app, "GET", "/api/cart", SHOPPER, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cart"]["items"][0]["quantity"], 2);

    // With stock dropped to 1 the next increment must fail and leave the
    // quantity untouched.
    sqlx::query("UPDATE products SET stock = 1 WHERE id = $1")
        .bind(product)
        .execute(&pool)
        .await
        .unwrap();
    let (status, body) = request(&app, "POST", "/api/cart", SHOPPER, Some(add)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Insufficient stock"));

    let (_, body) = request(&app, "GET", "/api/cart", SHOPPER, None).await;
    assert_eq!(body["cart"]["items"][0]["quantity"], 2);
}

#[sqlx::test]
async fn duplicate_review_is_rejected_and_count_unchanged(pool: PgPool) {
    let app = app(pool.clone());
    let product = seed_product(&pool, "Widget", "25.00", 3).await;
    let order_id = place_delivered_order(&app, product).await;

    let review = |rating: i32| {
        json!({ "product_id": product, "order_id": order_id, "rating": rating })
    };
    let (status, _) = request(&app, "POST", "/api/reviews", SHOPPER, Some(review(4))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rating_of(&pool, product).await, (4.0, 1));

    let (status, body) = request(&app, "POST", "/api/reviews", SHOPPER, Some(review(2))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already reviewed"));
    assert_eq!(rating_of(&pool, product).await, (4.0, 1));
}

#[sqlx::test]
async fn deleting_the_last_review_resets_aggregates(pool: PgPool) {
    let app = app(pool.clone());
    let product = seed_product(&pool, "Widget", "25.00", 3).await;
    let order_id = place_delivered_order(&app, product).await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/reviews",
        SHOPPER,
        Some(json!({ "product_id": product, "order_id": order_id, "rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rating_of(&pool, product).await, (5.0, 1));

    let review_id = body["review"]["id"].as_str().unwrap();
    let (status, _) =
        request(&app, "DELETE", &format!("/api/reviews/{review_id}"), SHOPPER, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rating_of(&pool, product).await, (0.0, 0));
}

#[sqlx::test]
async fn reviews_require_a_delivered_order(pool: PgPool) {
    let app = app(pool.clone());
    let product = seed_product(&pool, "Widget", "25.00", 3).await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/orders",
        SHOPPER,
        Some(json!({
            "items": [{ "product_id": product, "quantity": 1 }],
            "shipping_address": { "city": "London" },
            "total_price": "25.00",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["order"]["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "POST",
        "/api/reviews",
        SHOPPER,
        Some(json!({ "product_id": product, "order_id": order_id, "rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("delivered"));
    assert_eq!(rating_of(&pool, product).await, (0.0, 0));
}

#[sqlx::test]
async fn at_most_one_address_is_default(pool: PgPool) {
    let app = app(pool.clone());
    let address = |name: &str| {
        json!({
            "label": "Home",
            "full_name": name,
            "street_address": "1 Analytical Way",
            "city": "London",
            "state": "LDN",
            "zip_code": "E1 6AN",
            "is_default": true,
        })
    };

    let (status, _) =
        request(&app, "POST", "/api/users/addresses", SHOPPER, Some(address("First"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) =
        request(&app, "POST", "/api/users/addresses", SHOPPER, Some(address("Second"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let addresses = body["addresses"].as_array().unwrap();
    assert_eq!(addresses.len(), 2);
    let defaults: Vec<_> =
        addresses.iter().filter(|a| a["is_default"] == true).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["full_name"], "Second");
}

#[sqlx::test]
async fn tampered_signature_never_creates_an_order(pool: PgPool) {
    let app = app(pool.clone());
    let product = seed_product(&pool, "Widget", "10.00", 5).await;

    let mut signature = sign("order_abc", "pay_123");
    let flipped = if signature.ends_with('0') { '1' } else { '0' };
    signature.pop();
    signature.push(flipped);

    let (status, body) = request(
        &app,
        "POST",
        "/api/payments/verify",
        SHOPPER,
        Some(json!({
            "gateway_order_id": "order_abc",
            "gateway_payment_id": "pay_123",
            "gateway_signature": signature,
            "cart_items": [{ "product_id": product, "quantity": 1 }],
            "shipping_address": { "city": "London" },
            "total_amount": "20.80",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("signature"));
    assert_eq!(order_count(&pool).await, 0);
    assert_eq!(stock_of(&pool, product).await, 5);
}

#[sqlx::test]
async fn verified_payment_places_the_order(pool: PgPool) {
    let app = app(pool.clone());
    let product = seed_product(&pool, "Widget", "10.00", 5).await;

    let (status, body) = request(
        &app,
        "POST",
        "/api/payments/verify",
        SHOPPER,
        Some(json!({
            "gateway_order_id": "order_abc",
            "gateway_payment_id": "pay_123",
            "gateway_signature": sign("order_abc", "pay_123"),
            "cart_items": [{ "product_id": product, "quantity": 1 }],
            "shipping_address": { "city": "London" },
            "total_amount": "20.80",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(stock_of(&pool, product).await, 4);

    let payment_status: String = sqlx::query_scalar(
        "SELECT payment_result->>'status' FROM orders WHERE id = $1::uuid",
    )
    .bind(body["order"]["id"].as_str().unwrap())
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(payment_status, "completed");
}

#[sqlx::test]
async fn reused_email_under_a_new_subject_is_rejected(pool: PgPool) {
    let app = app(pool.clone());

    let (status, _) =
        request(&app, "GET", "/api/users/me", ("subject_a", "dup@example.com"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        request(&app, "GET", "/api/users/me", ("subject_b", "dup@example.com"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Email"));

    // The original identity still resolves.
    let (status, _) =
        request(&app, "GET", "/api/users/me", ("subject_a", "dup@example.com"), None).await;
    assert_eq!(status, StatusCode::OK);
}

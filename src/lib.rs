//! Storefront service
//!
//! A self-hosted storefront backend: product catalog, per-customer carts,
//! transactional checkout with stock deduction, gateway-verified payments,
//! delivery-gated reviews, and customer address/wishlist management.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod pricing;

use config::Config;
use gateway::PaymentGateway;
use handlers::{account, admin, cart, orders, payments, products, reviews};

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<Config>,
    pub gateway: Arc<PaymentGateway>,
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.and_then(|o| o.parse::<HeaderValue>().ok()) {
        Some(origin) => CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any),
        None => CorsLayer::permissive(),
    }
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());
    Router::new()
        .route("/api/health", get(|| async { Json(serde_json::json!({ "message": "Success" })) }))
        .route("/api/products", get(products::list_products))
        .route("/api/products/:id", get(products::get_product))
        .route(
            "/api/cart",
            get(cart::get_cart).post(cart::add_to_cart).delete(cart::clear_cart),
        )
        .route(
            "/api/cart/:product_id",
            put(cart::update_cart_item).delete(cart::remove_from_cart),
        )
        .route("/api/orders", post(orders::create_order).get(orders::list_orders))
        .route("/api/payments/create-order", post(payments::create_payment_order))
        .route("/api/payments/verify", post(payments::verify_payment))
        .route("/api/reviews", post(reviews::create_review))
        .route("/api/reviews/:review_id", delete(reviews::delete_review))
        .route("/api/users/me", get(account::get_me))
        .route(
            "/api/users/addresses",
            post(account::add_address).get(account::get_addresses),
        )
        .route(
            "/api/users/addresses/:address_id",
            put(account::update_address).delete(account::delete_address),
        )
        .route(
            "/api/users/wishlist",
            post(account::add_to_wishlist).get(account::get_wishlist),
        )
        .route("/api/users/wishlist/:product_id", delete(account::remove_from_wishlist))
        .route("/api/admin/products", post(admin::create_product).get(admin::list_products))
        .route(
            "/api/admin/products/:id",
            put(admin::update_product).delete(admin::delete_product),
        )
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/:order_id/status", patch(admin::update_order_status))
        .route("/api/admin/customers", get(admin::list_customers))
        .route("/api/admin/stats", get(admin::dashboard_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use config::GatewayConfig;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Config {
            database_url: "postgres://localhost/storefront_test".into(),
            port: 0,
            admin_email: "admin@example.com".into(),
            cors_origin: None,
            gateway: GatewayConfig {
                base_url: "http://localhost:9".into(),
                key_id: "key_test".into(),
                key_secret: "secret".into(),
                currency: "INR".into(),
            },
        };
        // Lazy pool: never connects unless a handler actually runs a query.
        let db = sqlx::postgres::PgPoolOptions::new().connect_lazy(&config.database_url).unwrap();
        AppState {
            db,
            gateway: Arc::new(PaymentGateway::new(&config.gateway)),
            config: Arc::new(config),
        }
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        let app = router(test_state());
        let res = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_identity_headers() {
        for uri in ["/api/cart", "/api/orders", "/api/users/me", "/api/admin/stats"] {
            let app = router(test_state());
            let res = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }
}

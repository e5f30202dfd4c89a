//! Payment gateway client over its REST API (no vendor SDK).
//!
//! The gateway issues an opaque order (id + amount) before the client-side
//! payment flow, then signs the completed payment with HMAC-SHA256 over
//! `order_id|payment_id` using the shared key secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::GatewayConfig;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

pub struct PaymentGateway {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    currency: String,
}

impl PaymentGateway {
    pub fn new(cfg: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            key_id: cfg.key_id.clone(),
            key_secret: cfg.key_secret.clone(),
            currency: cfg.currency.clone(),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Registers an order with the gateway; `amount_minor` is in the smallest
    /// currency unit.
    pub async fn create_order(&self, amount_minor: i64, receipt: &str) -> Result<GatewayOrder, reqwest::Error> {
        self.http
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&serde_json::json!({
                "amount": amount_minor,
                "currency": self.currency,
                "receipt": receipt,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Checks the hex-encoded payment signature against the HMAC we derive
    /// from the key secret.
    pub fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_signature(&self.key_secret, order_id, payment_id, signature)
    }
}

pub fn verify_signature(secret: &str, order_id: &str, payment_id: &str, signature: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{order_id}|{payment_id}").as_bytes());
    let Ok(sig) = hex::decode(signature) else {
        return false;
    };
    // Constant-time comparison via verify_slice.
    mac.verify_slice(&sig).is_ok()
}

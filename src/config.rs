//! Environment-backed configuration, read once at startup and handed to the
//! components that need it. No ambient globals.

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub admin_email: String,
    pub cors_origin: Option<String>,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub currency: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a number")?,
            admin_email: require("ADMIN_EMAIL")?,
            cors_origin: std::env::var("CORS_ORIGIN").ok(),
            gateway: GatewayConfig {
                base_url: std::env::var("PAYMENT_GATEWAY_URL")
                    .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
                key_id: require("PAYMENT_KEY_ID")?,
                key_secret: require("PAYMENT_KEY_SECRET")?,
                currency: std::env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            },
        })
    }
}

fn require(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

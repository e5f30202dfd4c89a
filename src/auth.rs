//! Identity resolution.
//!
//! Session verification happens upstream (external auth provider); the proxy
//! forwards the verified subject, email, and display name as headers. The
//! extractor resolves those to a customer row, creating it on first sight.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::Customer;
use crate::AppState;

const SUBJECT_HEADER: &str = "x-auth-subject";
const EMAIL_HEADER: &str = "x-auth-email";
const NAME_HEADER: &str = "x-auth-name";
const PICTURE_HEADER: &str = "x-auth-picture";

/// The authenticated customer attached to every protected request.
pub struct AuthCustomer(pub Customer);

/// An authenticated customer whose email matches the configured admin.
pub struct AdminCustomer(pub Customer);

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthCustomer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let subject = header(parts, SUBJECT_HEADER).ok_or(ApiError::Unauthorized)?;
        let email = header(parts, EMAIL_HEADER).ok_or(ApiError::Unauthorized)?;
        let name = header(parts, NAME_HEADER).unwrap_or_else(|| "Customer".to_string());
        let image_url = header(parts, PICTURE_HEADER);

        // Upsert keeps the profile in sync and auto-creates first-time
        // customers; the conflict arm also covers two racing first requests.
        let result = sqlx::query_as::<_, Customer>(
            "INSERT INTO customers (id, subject, email, name, image_url) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (subject) DO UPDATE \
             SET email = EXCLUDED.email, name = EXCLUDED.name, \
                 image_url = EXCLUDED.image_url, updated_at = NOW() \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&subject)
        .bind(&email)
        .bind(&name)
        .bind(&image_url)
        .fetch_one(&state.db)
        .await;

        match result {
            Ok(customer) => Ok(AuthCustomer(customer)),
            // The subject conflict is handled by the upsert; a unique
            // violation here means the email is taken by another subject.
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => {
                Err(ApiError::Validation(
                    "Email is already linked to another account".to_string(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminCustomer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthCustomer(customer) = AuthCustomer::from_request_parts(parts, state).await?;
        if customer.email != state.config.admin_email {
            return Err(ApiError::Forbidden("Forbidden - admin access only"));
        }
        Ok(AdminCustomer(customer))
    }
}

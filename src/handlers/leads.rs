use crate::{
    errors::ServiceError,
    handlers::common::{success_response, validate_input},
    AppState,
};
use axum::{extract::State, response::Response, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DiscountSignupRequest {
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub consent: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountSignupResponse {
    pub ok: bool,
    pub mailchimp_synced: bool,
    pub email_sent: bool,
    pub discount_code: String,
    pub discount_percent: Decimal,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_used: bool,
}

/// `POST /discount-signup`: issues (or re-sends) the one-time promotional
/// code for an email address.
async fn discount_signup(
    State(state): State<AppState>,
    Json(request): Json<DiscountSignupRequest>,
) -> Result<Response, ServiceError> {
    validate_input(&request)?;

    let outcome = state
        .services
        .leads
        .signup(&request.email, request.phone.as_deref(), request.consent)
        .await?;

    Ok(success_response(DiscountSignupResponse {
        ok: true,
        mailchimp_synced: outcome.mailchimp_synced,
        email_sent: outcome.email_sent,
        discount_code: outcome.discount_code,
        discount_percent: outcome.discount_percent,
        already_used: outcome.already_used,
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/discount-signup", post(discount_signup))
}

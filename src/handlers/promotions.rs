use crate::{
    catalog::DiscountType,
    errors::ServiceError,
    handlers::common::success_response,
    services::promotions::DiscountSource,
    AppState,
};
use axum::{extract::State, response::Response, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemRequest {
    pub code: String,
    pub email: Option<String>,
}

/// Uniform result shape: the client always gets `{ok, valid, ...}` JSON,
/// never a bare error status, so storefront code has exactly one path.
#[derive(Debug, Serialize, ToSchema)]
pub struct RedeemResponse {
    pub ok: bool,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_type: Option<DiscountType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DiscountSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /promo/redeem`: validates AND spends a code in one step. A valid
/// one-time code returned here is burned even if the customer never
/// completes checkout.
async fn redeem_promo(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> Response {
    let outcome = state
        .services
        .promotions
        .redeem(&request.code, request.email.as_deref())
        .await;

    let body = match outcome {
        Ok(discount) => RedeemResponse {
            ok: true,
            valid: true,
            discount_type: Some(discount.discount_type),
            value: Some(discount.value),
            source: Some(discount.source),
            error: None,
        },
        Err(ServiceError::ValidationError(reason)) => RedeemResponse {
            ok: false,
            valid: false,
            discount_type: None,
            value: None,
            source: None,
            error: Some(reason),
        },
        Err(e) => {
            error!(error = %e, "promo redemption failed");
            RedeemResponse {
                ok: false,
                valid: false,
                discount_type: None,
                value: None,
                source: None,
                error: Some("Unable to validate this code right now".to_string()),
            }
        }
    };

    success_response(body)
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/promo/redeem", post(redeem_promo))
}

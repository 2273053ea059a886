use crate::{
    auth::MaybeUser,
    errors::ServiceError,
    gateway::BillingInterval,
    handlers::common::{success_response, SessionId},
    AppState,
};
use axum::{extract::State, response::Response, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Present selects the subscription path; absent checks out the cart
    pub plan_slug: Option<String>,
    /// `month` (default) or `year`
    pub interval: Option<String>,
    pub return_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub url: String,
}

/// `POST /checkout`: creates a hosted payment session and returns the
/// redirect URL. Cart checkout is keyed off the session header and works
/// anonymously when the cart captured a contact email; subscription checkout
/// requires a signed-in customer.
async fn create_checkout(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    session: Option<SessionId>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, ServiceError> {
    let session = match request.plan_slug.as_deref() {
        Some(plan_slug) => {
            let user = user.ok_or_else(|| {
                ServiceError::Unauthorized("Sign in to start a subscription".to_string())
            })?;
            let interval = match request.interval.as_deref() {
                Some(raw) => raw.parse::<BillingInterval>().map_err(|_| {
                    ServiceError::ValidationError(format!(
                        "Unknown billing interval '{}'; expected month or year",
                        raw
                    ))
                })?,
                None => BillingInterval::default(),
            };
            state
                .services
                .checkout
                .create_subscription_session(
                    plan_slug,
                    interval,
                    &user,
                    request.return_url.as_deref(),
                )
                .await?
        }
        None => {
            let SessionId(session_id) = session.ok_or_else(|| {
                ServiceError::ValidationError(
                    "A cart session is required to check out".to_string(),
                )
            })?;
            state
                .services
                .checkout
                .create_cart_session(&session_id, user.as_ref(), request.return_url.as_deref())
                .await?
        }
    };

    Ok(success_response(CheckoutResponse { url: session.url }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/checkout", post(create_checkout))
}

use crate::{
    entities::{cart, cart_item},
    errors::ServiceError,
    handlers::common::{created_response, success_response, SessionId},
    services::cart::{AddItemInput, ContactInput},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct CartResponse {
    cart: Option<cart::Model>,
    items: Vec<cart_item::Model>,
}

#[derive(Debug, Deserialize)]
struct QuantityInput {
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct PromoInput {
    code: Option<String>,
}

/// `GET /cart`: the session's cart and items; an untouched session gets an
/// empty shape rather than a 404.
async fn get_cart(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
) -> Result<Response, ServiceError> {
    let body = match state.services.cart.find_with_items(&session_id).await? {
        Some((cart, items)) => CartResponse {
            cart: Some(cart),
            items,
        },
        None => CartResponse {
            cart: None,
            items: Vec::new(),
        },
    };
    Ok(success_response(body))
}

async fn add_item(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    Json(input): Json<AddItemInput>,
) -> Result<Response, ServiceError> {
    let item = state.services.cart.add_item(&session_id, input).await?;
    Ok(created_response(item))
}

async fn update_item(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    Path(item_id): Path<Uuid>,
    Json(input): Json<QuantityInput>,
) -> Result<Response, ServiceError> {
    state
        .services
        .cart
        .update_item_quantity(&session_id, item_id, input.quantity)
        .await?;
    Ok(success_response(serde_json::json!({ "ok": true })))
}

async fn remove_item(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.cart.remove_item(&session_id, item_id).await?;
    Ok(success_response(serde_json::json!({ "ok": true })))
}

async fn set_contact(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    Json(input): Json<ContactInput>,
) -> Result<Response, ServiceError> {
    let cart = state.services.cart.set_contact(&session_id, input).await?;
    Ok(success_response(cart))
}

/// Attaches a code without validating it; the code is validated (and spent)
/// at checkout.
async fn set_promo(
    State(state): State<AppState>,
    SessionId(session_id): SessionId,
    Json(input): Json<PromoInput>,
) -> Result<Response, ServiceError> {
    let cart = state
        .services
        .cart
        .set_promo_code(&session_id, input.code)
        .await?;
    Ok(success_response(cart))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:id", axum::routing::patch(update_item).delete(remove_item))
        .route("/cart/contact", put(set_contact))
        .route("/cart/promo", put(set_promo))
}

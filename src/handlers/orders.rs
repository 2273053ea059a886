use crate::{
    auth::AuthenticatedUser,
    entities::order,
    errors::ServiceError,
    handlers::common::success_response,
    services::orders::RescheduleInput,
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::delete,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct OrderResponse {
    ok: bool,
    order: order::Model,
}

/// `DELETE /orders/:id`: cancels the order and reverses its payment.
/// Owner-only; idempotent on repeat calls.
async fn refund_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.refund(order_id, &user.email).await?;
    Ok(success_response(OrderResponse { ok: true, order }))
}

/// `PATCH /orders/:id`: moves a still-schedulable order to a new date/time.
async fn reschedule_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<RescheduleInput>,
) -> Result<Response, ServiceError> {
    let order = state
        .services
        .orders
        .reschedule(order_id, &user.email, input)
        .await?;
    Ok(success_response(OrderResponse { ok: true, order }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/orders/:id", delete(refund_order).patch(reschedule_order))
}

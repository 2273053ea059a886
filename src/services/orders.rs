use crate::{
    entities::{order, Order},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::PaymentGateway,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Post-purchase order mutations: refund and reschedule, both under
/// ownership guards keyed on the authenticated email.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleInput {
    pub date: String,
    pub time: String,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            gateway,
            event_sender,
        }
    }

    /// Cancels an order and reverses its payment. Subscriptions are managed
    /// at the gateway and cannot be refunded here. Calling refund on an
    /// already-refunded order is a no-op success, never a second reversal.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        order_id: Uuid,
        requester_email: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find_owned(order_id, requester_email).await?;

        if order.is_subscription {
            return Err(ServiceError::InvalidOperation(
                "Subscription orders cannot be refunded here; manage the subscription instead"
                    .to_string(),
            ));
        }

        if order.refunded {
            info!(order_id = %order.id, "order already refunded; nothing to do");
            return Ok(order);
        }

        match &order.gateway_session_id {
            Some(session_id) => {
                match self.gateway.session_payment_reference(session_id).await? {
                    Some(payment_reference) => {
                        let refund_id = self.gateway.create_refund(&payment_reference).await?;
                        info!(order_id = %order.id, refund_id, "payment reversed at gateway");
                    }
                    None => {
                        warn!(
                            order_id = %order.id,
                            "checkout session has no captured payment; cancelling without reversal"
                        );
                    }
                }
            }
            None => {
                warn!(
                    order_id = %order.id,
                    "order has no gateway session; cancelling without reversal"
                );
            }
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set("refunded".to_string());
        active.refunded = Set(true);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::OrderRefunded(updated.id))
            .await;
        info!(order_id = %updated.id, "order refunded");
        Ok(updated)
    }

    /// Moves a schedulable order to a new date/time. Writes the top-level
    /// schedule and the mirrored first-line-item schedule in one targeted
    /// update so orders persisted under older item shapes still reschedule.
    #[instrument(skip(self, input))]
    pub async fn reschedule(
        &self,
        order_id: Uuid,
        requester_email: &str,
        input: RescheduleInput,
    ) -> Result<order::Model, ServiceError> {
        let order = self.find_owned(order_id, requester_email).await?;

        if !order.status.to_lowercase().contains("schedule") {
            return Err(ServiceError::InvalidOperation(format!(
                "Order in status '{}' cannot be rescheduled",
                order.status
            )));
        }

        let schedule = serde_json::json!({ "date": input.date, "time": input.time });
        let items = mirror_first_item_schedule(&order.items, &schedule);

        Order::update_many()
            .col_expr(order::Column::Schedule, Expr::value(Some(schedule)))
            .col_expr(order::Column::Items, Expr::value(items))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .exec(&*self.db)
            .await?;

        let updated = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        self.event_sender
            .send_or_log(Event::OrderRescheduled(updated.id))
            .await;
        info!(order_id = %updated.id, date = %input.date, time = %input.time, "order rescheduled");
        Ok(updated)
    }

    /// Loads the order and enforces ownership by case-insensitive email
    /// comparison. A non-owner gets Forbidden, not NotFound, matching the
    /// authenticated surface these endpoints sit behind.
    async fn find_owned(
        &self,
        order_id: Uuid,
        requester_email: &str,
    ) -> Result<order::Model, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.email.eq_ignore_ascii_case(requester_email) {
            return Err(ServiceError::Forbidden(
                "Order does not belong to the requesting customer".to_string(),
            ));
        }

        Ok(order)
    }
}

/// Rewrites the first line item's `schedule` field when items are an array;
/// any other stored shape passes through untouched.
fn mirror_first_item_schedule(items: &serde_json::Value, schedule: &serde_json::Value) -> serde_json::Value {
    let mut items = items.clone();
    if let Some(first) = items.as_array_mut().and_then(|a| a.first_mut()) {
        if let Some(obj) = first.as_object_mut() {
            obj.insert("schedule".to_string(), schedule.clone());
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_item_schedule_is_mirrored() {
        let items = json!([
            {"service_id": "tv-mount", "schedule": {"date": "old", "time": "old"}},
            {"service_id": "wifi-setup"}
        ]);
        let schedule = json!({"date": "2026-09-01", "time": "14:00"});
        let updated = mirror_first_item_schedule(&items, &schedule);

        assert_eq!(updated[0]["schedule"], schedule);
        assert_eq!(updated[1], json!({"service_id": "wifi-setup"}));
    }

    #[test]
    fn non_array_items_pass_through() {
        let items = json!({"legacy": true});
        let schedule = json!({"date": "2026-09-01", "time": "14:00"});
        assert_eq!(mirror_first_item_schedule(&items, &schedule), items);
    }

    #[test]
    fn empty_items_pass_through() {
        let items = json!([]);
        let schedule = json!({"date": "2026-09-01", "time": "14:00"});
        assert_eq!(mirror_first_item_schedule(&items, &schedule), json!([]));
    }
}

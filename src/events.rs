use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Domain events emitted by the checkout and order lifecycle services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutSessionCreated {
        cart_session_id: Option<String>,
        gateway_session_id: String,
        subscription: bool,
    },
    PromoCodeRedeemed {
        code: String,
        source: String,
    },
    DiscountLeadSignedUp {
        email: String,
    },
    OrderRefunded(Uuid),
    OrderRescheduled(Uuid),
    PlanPriceSynced {
        plan_slug: String,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs on failure. Event delivery is never allowed
    /// to fail a customer-facing request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Drains the event channel and logs each event. Downstream consumers
/// (webhooks, analytics) attach here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        debug!(?event, "processing event");
    }
}

use crate::config::AppConfig;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Best-effort side channel to the CRM and transactional-email webhooks.
///
/// Nothing here is authoritative: every failure is a warning and a `false`
/// outcome flag, never an error surfaced to the caller.
#[derive(Clone)]
pub struct NotificationService {
    http: reqwest::Client,
    crm_webhook_url: Option<String>,
    email_webhook_url: Option<String>,
}

impl NotificationService {
    pub fn new(config: &Arc<AppConfig>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            crm_webhook_url: config.crm_webhook_url.clone(),
            email_webhook_url: config.email_webhook_url.clone(),
        }
    }

    /// Pushes a lead contact to the CRM. Returns whether the sync landed.
    pub async fn sync_crm_contact(&self, email: &str, phone: Option<&str>, consent: bool) -> bool {
        let Some(url) = &self.crm_webhook_url else {
            return false;
        };
        let payload = json!({
            "email": email,
            "phone": phone,
            "marketing_consent": consent,
        });
        self.post(url, payload, "crm contact sync").await
    }

    /// Sends (or re-sends) the discount code email. Returns whether the
    /// webhook accepted it.
    pub async fn send_discount_email(&self, email: &str, code: &str, percent: Decimal) -> bool {
        let Some(url) = &self.email_webhook_url else {
            return false;
        };
        let payload = json!({
            "to": email,
            "template": "discount_code",
            "discount_code": code,
            "discount_percent": percent,
        });
        self.post(url, payload, "discount email").await
    }

    async fn post(&self, url: &str, payload: serde_json::Value, what: &str) -> bool {
        match self.http.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(what, "notification delivered");
                true
            }
            Ok(response) => {
                warn!(what, status = %response.status(), "notification webhook rejected payload");
                false
            }
            Err(e) => {
                warn!(what, error = %e, "notification webhook unreachable");
                false
            }
        }
    }
}

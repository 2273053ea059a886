use crate::{
    config::AppConfig,
    entities::{discount_lead, DiscountLead},
    errors::ServiceError,
    events::{Event, EventSender},
    services::notifications::NotificationService,
    services::promotions::normalize_code,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Outcome of a discount signup. The side-channel flags report what
/// actually landed; the caller shapes them straight into the response.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSignupOutcome {
    pub discount_code: String,
    pub discount_percent: Decimal,
    pub mailchimp_synced: bool,
    pub email_sent: bool,
    pub already_used: bool,
}

/// Issues and re-sends the shared one-time promotional code to signup leads.
#[derive(Clone)]
pub struct LeadService {
    db: Arc<DatabaseConnection>,
    config: Arc<AppConfig>,
    notifications: NotificationService,
    event_sender: Arc<EventSender>,
}

impl LeadService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        notifications: NotificationService,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            config,
            notifications,
            event_sender,
        }
    }

    /// Signs an email up for the promotional code, or re-sends it to an
    /// existing lead. Re-sends are rate-limited per email; a lead whose code
    /// was already redeemed gets the `already_used` flag instead of a new
    /// code.
    #[instrument(skip(self, phone))]
    pub async fn signup(
        &self,
        email: &str,
        phone: Option<&str>,
        consent: bool,
    ) -> Result<LeadSignupOutcome, ServiceError> {
        let email_lower = email.trim().to_lowercase();
        if email_lower.is_empty() {
            return Err(ServiceError::ValidationError(
                "Email is required".to_string(),
            ));
        }

        let code = normalize_code(&self.config.shared_lead_code);
        let percent = self.config.default_lead_discount_percent;

        let existing = DiscountLead::find()
            .filter(discount_lead::Column::EmailLower.eq(&email_lower))
            .one(&*self.db)
            .await?;

        if let Some(lead) = existing {
            if lead.redeemed_at.is_some() {
                return Ok(LeadSignupOutcome {
                    discount_code: lead.discount_code,
                    discount_percent: lead.discount_percent,
                    mailchimp_synced: false,
                    email_sent: false,
                    already_used: true,
                });
            }

            let resend_window = Duration::hours(self.config.lead_resend_interval_hours);
            if Utc::now() - lead.code_sent_at < resend_window {
                info!(email = %email_lower, "signup within re-send window; code not re-sent");
                return Ok(LeadSignupOutcome {
                    discount_code: lead.discount_code,
                    discount_percent: lead.discount_percent,
                    mailchimp_synced: false,
                    email_sent: false,
                    already_used: false,
                });
            }

            let email_sent = self
                .notifications
                .send_discount_email(&email_lower, &lead.discount_code, lead.discount_percent)
                .await;

            let outcome = LeadSignupOutcome {
                discount_code: lead.discount_code.clone(),
                discount_percent: lead.discount_percent,
                mailchimp_synced: false,
                email_sent,
                already_used: false,
            };

            let mut active: discount_lead::ActiveModel = lead.into();
            if email_sent {
                active.code_sent_at = Set(Utc::now());
            }
            if phone.is_some() {
                active.phone = Set(phone.map(str::to_string));
            }
            active.consent = Set(consent);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;

            return Ok(outcome);
        }

        let mailchimp_synced = self
            .notifications
            .sync_crm_contact(&email_lower, phone, consent)
            .await;
        let email_sent = self
            .notifications
            .send_discount_email(&email_lower, &code, percent)
            .await;

        let now = Utc::now();
        discount_lead::ActiveModel {
            id: Set(Uuid::new_v4()),
            email_lower: Set(email_lower.clone()),
            phone: Set(phone.map(str::to_string)),
            consent: Set(consent),
            discount_code: Set(code.clone()),
            discount_percent: Set(percent),
            code_sent_at: Set(now),
            redeemed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::DiscountLeadSignedUp {
                email: email_lower.clone(),
            })
            .await;
        info!(email = %email_lower, "discount lead signed up");

        Ok(LeadSignupOutcome {
            discount_code: code,
            discount_percent: percent,
            mailchimp_synced,
            email_sent,
            already_used: false,
        })
    }
}

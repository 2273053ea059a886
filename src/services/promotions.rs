use crate::{
    catalog::{CatalogClient, DiscountType},
    config::AppConfig,
    entities::{discount_lead, DiscountLead},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
};
use serde::Serialize;
use std::sync::Arc;
use strum::Display;
use tracing::{info, instrument, warn};

/// Failure message for a lead code that did not redeem. Deliberately does
/// not disclose whether the code was already spent or never issued.
const ALREADY_USED: &str = "This code has already been used or is not valid";

/// Where a resolved discount came from, recorded in session metadata for
/// downstream bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountSource {
    SharedLead,
    Lead,
    Merchant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedDiscount {
    pub code: String,
    pub discount_type: DiscountType,
    /// Percent in [0, 100] or a flat amount in currency units
    pub value: Decimal,
    pub source: DiscountSource,
}

/// Outcome of a single resolver strategy. `NotFound` falls through to the
/// next strategy; `Invalid` short-circuits the chain.
#[derive(Debug)]
enum Resolution {
    Found(ResolvedDiscount),
    NotFound,
    Invalid(String),
}

/// Promotion resolver over two independent code sources.
///
/// Lead codes (shared and per-customer) are one-time: redemption is a single
/// conditional update with `redeemed_at IS NULL` as the fence, so two
/// concurrent attempts produce exactly one success. Merchant codes are
/// multi-use by design and only carry an advisory usage counter.
///
/// Validating a code *is* spending it: a customer who validates a one-time
/// code and abandons checkout has burned the code. That is intentional.
#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<dyn CatalogClient>,
    config: Arc<AppConfig>,
    event_sender: Arc<EventSender>,
}

impl PromotionService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<dyn CatalogClient>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            catalog,
            config,
            event_sender,
        }
    }

    /// Validates and redeems a code. Strategies run in order; the first
    /// non-`NotFound` outcome wins.
    #[instrument(skip(self))]
    pub async fn redeem(
        &self,
        code: &str,
        email: Option<&str>,
    ) -> Result<ResolvedDiscount, ServiceError> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Promo code is required".to_string(),
            ));
        }
        let email_lower = email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());

        // Strategies run lazily: a later source is only consulted when the
        // earlier ones report NotFound.
        let resolution = match self.resolve_shared_lead(&code, email_lower.as_deref()).await? {
            Resolution::NotFound => {
                match self.resolve_lead(&code, email_lower.as_deref()).await? {
                    Resolution::NotFound => self.resolve_merchant(&code).await?,
                    other => other,
                }
            }
            other => other,
        };

        match resolution {
            Resolution::Found(discount) => {
                self.event_sender
                    .send_or_log(Event::PromoCodeRedeemed {
                        code: discount.code.clone(),
                        source: discount.source.to_string(),
                    })
                    .await;
                info!(code = %discount.code, source = %discount.source, "promo code redeemed");
                Ok(discount)
            }
            Resolution::Invalid(reason) => Err(ServiceError::ValidationError(reason)),
            Resolution::NotFound => Err(ServiceError::ValidationError(
                "Not a valid promo code".to_string(),
            )),
        }
    }

    /// Strategy 1: the configured shared "first service" code, one use per
    /// signed-up email.
    async fn resolve_shared_lead(
        &self,
        code: &str,
        email_lower: Option<&str>,
    ) -> Result<Resolution, ServiceError> {
        if code != normalize_code(&self.config.shared_lead_code) {
            return Ok(Resolution::NotFound);
        }

        let Some(email_lower) = email_lower else {
            return Ok(Resolution::Invalid(
                "Email is required to redeem this code".to_string(),
            ));
        };

        let lead = DiscountLead::find()
            .filter(discount_lead::Column::EmailLower.eq(email_lower))
            .filter(discount_lead::Column::DiscountCode.eq(code))
            .filter(discount_lead::Column::RedeemedAt.is_null())
            .one(&*self.db)
            .await?;

        let Some(lead) = lead else {
            return Ok(Resolution::Invalid(ALREADY_USED.to_string()));
        };

        if !self
            .mark_redeemed(code, Some(email_lower))
            .await?
        {
            // Lost the race to a concurrent redemption
            return Ok(Resolution::Invalid(ALREADY_USED.to_string()));
        }

        Ok(Resolution::Found(ResolvedDiscount {
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            value: effective_percent(lead.discount_percent, self.config.default_lead_discount_percent),
            source: DiscountSource::SharedLead,
        }))
    }

    /// Strategy 2: any other lead-issued code. When several signups share a
    /// code and no email was supplied, fail closed asking for the signup
    /// email rather than guessing.
    async fn resolve_lead(
        &self,
        code: &str,
        email_lower: Option<&str>,
    ) -> Result<Resolution, ServiceError> {
        let total_with_code = DiscountLead::find()
            .filter(discount_lead::Column::DiscountCode.eq(code))
            .count(&*self.db)
            .await?;
        if total_with_code == 0 {
            return Ok(Resolution::NotFound);
        }

        if total_with_code > 1 && email_lower.is_none() {
            return Ok(Resolution::Invalid(
                "This code is linked to multiple signups; provide the email used at signup"
                    .to_string(),
            ));
        }

        let mut unredeemed = DiscountLead::find()
            .filter(discount_lead::Column::DiscountCode.eq(code))
            .filter(discount_lead::Column::RedeemedAt.is_null());
        if let Some(email_lower) = email_lower {
            unredeemed = unredeemed.filter(discount_lead::Column::EmailLower.eq(email_lower));
        }
        let Some(lead) = unredeemed.one(&*self.db).await? else {
            return Ok(Resolution::Invalid(ALREADY_USED.to_string()));
        };

        if !self.mark_redeemed(code, email_lower).await? {
            return Ok(Resolution::Invalid(ALREADY_USED.to_string()));
        }

        Ok(Resolution::Found(ResolvedDiscount {
            code: code.to_string(),
            discount_type: DiscountType::Percentage,
            value: effective_percent(lead.discount_percent, self.config.default_lead_discount_percent),
            source: DiscountSource::Lead,
        }))
    }

    /// Strategy 3: merchant-authored codes from the content repository.
    /// Multi-use; the usage counter is advisory and its increment is
    /// deliberately not atomic.
    async fn resolve_merchant(&self, code: &str) -> Result<Resolution, ServiceError> {
        let Some(promo) = self.catalog.find_promo_code(code).await? else {
            return Ok(Resolution::NotFound);
        };

        if !promo.is_usable(Utc::now()) {
            return Ok(Resolution::Invalid(
                "This promo code is expired or inactive".to_string(),
            ));
        }

        if let Err(e) = self.catalog.increment_promo_usage(code).await {
            warn!(code, error = %e, "promo usage increment failed (advisory only)");
        }

        Ok(Resolution::Found(ResolvedDiscount {
            code: promo.code,
            discount_type: promo.discount_type,
            value: promo.value,
            source: DiscountSource::Merchant,
        }))
    }

    /// The one correctness-critical atomic primitive in this subsystem: set
    /// `redeemed_at` only where the code matches and it is still null, in a
    /// single conditional update. Exactly one of any set of concurrent
    /// attempts observes `rows_affected == 1`.
    async fn mark_redeemed(
        &self,
        code: &str,
        email_lower: Option<&str>,
    ) -> Result<bool, ServiceError> {
        let mut update = DiscountLead::update_many()
            .col_expr(
                discount_lead::Column::RedeemedAt,
                Expr::value(Some(Utc::now())),
            )
            .col_expr(discount_lead::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(discount_lead::Column::DiscountCode.eq(code))
            .filter(discount_lead::Column::RedeemedAt.is_null());
        if let Some(email_lower) = email_lower {
            update = update.filter(discount_lead::Column::EmailLower.eq(email_lower));
        }

        let result = update.exec(&*self.db).await?;
        Ok(result.rows_affected == 1)
    }
}

/// Codes are matched case-insensitively and whitespace-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn effective_percent(stored: Decimal, fallback: Decimal) -> Decimal {
    if stored > Decimal::ZERO && stored <= Decimal::from(100) {
        stored
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn codes_normalize_to_upper_trimmed() {
        assert_eq!(normalize_code("  welcome10 "), "WELCOME10");
        assert_eq!(normalize_code("MyFirstService"), "MYFIRSTSERVICE");
        assert_eq!(normalize_code("   "), "");
    }

    #[test]
    fn stored_percent_wins_when_in_range() {
        assert_eq!(effective_percent(dec!(15), dec!(10)), dec!(15));
    }

    #[test]
    fn out_of_range_percent_falls_back_to_default() {
        assert_eq!(effective_percent(dec!(0), dec!(10)), dec!(10));
        assert_eq!(effective_percent(dec!(150), dec!(10)), dec!(10));
        assert_eq!(effective_percent(dec!(-5), dec!(10)), dec!(10));
    }

    #[test]
    fn discount_source_serializes_snake_case() {
        assert_eq!(DiscountSource::SharedLead.to_string(), "shared_lead");
        assert_eq!(DiscountSource::Merchant.to_string(), "merchant");
        assert_eq!(
            serde_json::to_string(&DiscountSource::Lead).unwrap(),
            "\"lead\""
        );
    }
}

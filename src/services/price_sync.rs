use crate::{
    catalog::{CatalogClient, PricingPlan},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{to_minor_units, BillingInterval, PaymentGateway},
};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Converges the gateway's stored price for a subscription product to the
/// catalog-declared price.
///
/// The catalog is always the eventual-consistency target; the gateway is the
/// eventually-converging replica. Repair runs detached from the checkout
/// that noticed the drift, so a customer may still transact at the old
/// gateway price while synchronization catches up.
#[derive(Clone)]
pub struct PlanPriceSyncService {
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn CatalogClient>,
    event_sender: Arc<EventSender>,
}

impl PlanPriceSyncService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn CatalogClient>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            gateway,
            catalog,
            event_sender,
        }
    }

    /// Submits the repair as a detached task. Failures are logged and
    /// swallowed; the next checkout that sees drift retries the whole
    /// sequence. There is no retry policy here on purpose.
    pub fn spawn(&self, plan: PricingPlan, interval: BillingInterval) {
        let sync = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sync.sync_plan(&plan, interval).await {
                error!(
                    plan_slug = %plan.slug,
                    error = %e,
                    "plan price synchronization failed; will retry on next drift detection"
                );
            }
        });
    }

    /// The write-side repair: clear the default price pointer, retire every
    /// active price, create a price at the catalog amount, repoint the
    /// default, and record the synchronized value back in the catalog.
    #[instrument(skip(self, plan), fields(plan_slug = %plan.slug))]
    pub async fn sync_plan(
        &self,
        plan: &PricingPlan,
        interval: BillingInterval,
    ) -> Result<(), ServiceError> {
        let product_id = plan.gateway_product_id.as_deref().ok_or_else(|| {
            ServiceError::ConfigurationError(format!(
                "Plan '{}' has no gateway product to synchronize",
                plan.slug
            ))
        })?;
        let target_price = plan_price_for_interval(plan, interval);
        let target_minor = to_minor_units(target_price)?;

        // The default pointer must be cleared before its price can be retired
        self.gateway.set_default_price(product_id, None).await?;

        for stale in self.gateway.list_active_prices(product_id).await? {
            self.gateway.deactivate_price(&stale.id).await?;
        }

        let new_price = self
            .gateway
            .create_price(product_id, target_minor, interval)
            .await?;
        self.gateway
            .set_default_price(product_id, Some(&new_price.id))
            .await?;

        self.catalog
            .update_plan_synced_price(&plan.slug, target_price)
            .await?;

        self.event_sender
            .send_or_log(Event::PlanPriceSynced {
                plan_slug: plan.slug.clone(),
            })
            .await;
        info!(
            plan_slug = %plan.slug,
            price = %target_price,
            %interval,
            "gateway price converged to catalog price"
        );
        Ok(())
    }
}

/// Catalog price for the requested billing interval. Annual plans without a
/// declared annual price fall back to twelve monthly payments.
pub fn plan_price_for_interval(
    plan: &PricingPlan,
    interval: BillingInterval,
) -> rust_decimal::Decimal {
    match interval {
        BillingInterval::Month => plan.price,
        BillingInterval::Year => plan
            .annual_price
            .unwrap_or_else(|| plan.price * rust_decimal::Decimal::from(12)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn plan(price: rust_decimal::Decimal, annual: Option<rust_decimal::Decimal>) -> PricingPlan {
        PricingPlan {
            slug: "home-care".into(),
            title: "Home Care".into(),
            price,
            annual_price: annual,
            duration: None,
            gateway_product_id: Some("prod_1".into()),
            last_synced_price: None,
        }
    }

    #[test]
    fn monthly_interval_uses_plan_price() {
        assert_eq!(
            plan_price_for_interval(&plan(dec!(29.99), Some(dec!(299))), BillingInterval::Month),
            dec!(29.99)
        );
    }

    #[test]
    fn yearly_interval_prefers_declared_annual_price() {
        assert_eq!(
            plan_price_for_interval(&plan(dec!(29.99), Some(dec!(299))), BillingInterval::Year),
            dec!(299)
        );
    }

    #[test]
    fn yearly_interval_falls_back_to_twelve_months() {
        assert_eq!(
            plan_price_for_interval(&plan(dec!(10), None), BillingInterval::Year),
            dec!(120)
        );
    }
}

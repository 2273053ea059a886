use crate::{
    catalog::CatalogClient,
    entities::cart_item,
    errors::ServiceError,
    services::cart::line_price,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Pricing resolver: re-derives authoritative prices from the catalog
/// immediately before any money-moving operation.
///
/// Client-submitted prices are advisory only. Add-on prices are *not*
/// re-priced: they are discrete questionnaire choices captured at selection
/// time, not catalog prices.
#[derive(Clone)]
pub struct PricingService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<dyn CatalogClient>,
}

impl PricingService {
    pub fn new(db: Arc<DatabaseConnection>, catalog: Arc<dyn CatalogClient>) -> Self {
        Self { db, catalog }
    }

    /// Replaces each item's `base_price` with the catalog's current price
    /// and recomputes `price = base + Σ add-ons`, persisting the refreshed
    /// rows so the stored cart matches what the gateway will charge.
    ///
    /// A service that no longer resolves keeps its last-known price: stale
    /// price beats a failed checkout. Operators see it as a warning.
    #[instrument(skip(self, items))]
    pub async fn reconcile_cart(
        &self,
        items: Vec<cart_item::Model>,
    ) -> Result<Vec<cart_item::Model>, ServiceError> {
        let mut refreshed = Vec::with_capacity(items.len());

        for item in items {
            let base_price = match self.catalog.service_price(&item.service_id).await {
                Ok(Some(current)) => current,
                Ok(None) => {
                    warn!(
                        service_id = %item.service_id,
                        stale_price = %item.base_price,
                        "service no longer in catalog; charging last-known price"
                    );
                    item.base_price
                }
                Err(e) => {
                    warn!(
                        service_id = %item.service_id,
                        error = %e,
                        "catalog lookup failed; charging last-known price"
                    );
                    item.base_price
                }
            };

            let price = line_price(base_price, &item.add_ons());

            if base_price != item.base_price || price != item.price {
                let mut active: cart_item::ActiveModel = item.clone().into();
                active.base_price = Set(base_price);
                active.price = Set(price);
                active.updated_at = Set(Utc::now());
                refreshed.push(active.update(&*self.db).await?);
            } else {
                refreshed.push(item);
            }
        }

        Ok(refreshed)
    }
}

use crate::{
    auth::AuthenticatedUser,
    catalog::CatalogClient,
    config::AppConfig,
    entities::{cart, cart_item},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{
        to_minor_units, BillingInterval, CreateSessionRequest, GatewayPrice, GatewaySession,
        PaymentGateway, SessionLineItem, SessionMode,
    },
    services::{
        cart::{CartService, ServiceAddress, ServiceSchedule},
        price_sync::{plan_price_for_interval, PlanPriceSyncService},
        pricing::PricingService,
        promotions::{PromotionService, ResolvedDiscount},
    },
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Builds hosted checkout sessions from a reconciled cart (one-time) or a
/// pricing plan (subscription), and returns the gateway redirect URL.
#[derive(Clone)]
pub struct CheckoutService {
    cart: CartService,
    pricing: PricingService,
    promotions: PromotionService,
    price_sync: PlanPriceSyncService,
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn CatalogClient>,
    config: Arc<AppConfig>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cart: CartService,
        pricing: PricingService,
        promotions: PromotionService,
        price_sync: PlanPriceSyncService,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn CatalogClient>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            cart,
            pricing,
            promotions,
            price_sync,
            gateway,
            catalog,
            config,
            event_sender,
        }
    }

    /// One-time cart checkout. Reconciles prices against the catalog,
    /// redeems the attached promo code (if any), and creates a payment-mode
    /// session carrying the full order-reconstruction metadata envelope.
    #[instrument(skip(self, user))]
    pub async fn create_cart_session(
        &self,
        session_id: &str,
        user: Option<&AuthenticatedUser>,
        return_url: Option<&str>,
    ) -> Result<GatewaySession, ServiceError> {
        let Some((cart, items)) = self.cart.find_with_items(session_id).await? else {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        };
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }

        // Authenticated identity wins over whatever the cart captured
        let email = user
            .map(|u| u.email.clone())
            .or_else(|| cart.contact_email.clone())
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "An email address is required to check out".to_string(),
                )
            })?;

        let items = self.pricing.reconcile_cart(items).await?;

        // Validating the attached code spends it; a burned one-time code
        // fails the checkout rather than silently dropping the discount
        let discount = match &cart.promo_code {
            Some(code) => Some(self.promotions.redeem(code, Some(&email)).await?),
            None => None,
        };

        let coupon_id = match &discount {
            Some(d) => Some(
                self.gateway
                    .create_coupon(d.discount_type, d.value)
                    .await?,
            ),
            None => None,
        };

        let request = CreateSessionRequest {
            line_items: build_line_items(&items),
            price_id: None,
            customer_id: None,
            customer_email: Some(email),
            coupon_id,
            metadata: build_metadata(&cart, &items, discount.as_ref()),
            success_url: return_url
                .map(str::to_string)
                .unwrap_or_else(|| self.config.checkout_success_url.clone()),
            cancel_url: self.config.checkout_cancel_url.clone(),
        };

        let session = self
            .gateway
            .create_checkout_session(SessionMode::Payment, request)
            .await?;

        self.event_sender
            .send_or_log(Event::CheckoutSessionCreated {
                cart_session_id: Some(session_id.to_string()),
                gateway_session_id: session.id.clone(),
                subscription: false,
            })
            .await;
        info!(gateway_session_id = %session.id, "created cart checkout session");
        Ok(session)
    }

    /// Subscription checkout for an authenticated customer. Uses whatever
    /// price the gateway currently holds for the interval; drift against the
    /// catalog is repaired in the background without blocking the session.
    #[instrument(skip(self, user), fields(user_email = %user.email))]
    pub async fn create_subscription_session(
        &self,
        plan_slug: &str,
        interval: BillingInterval,
        user: &AuthenticatedUser,
        return_url: Option<&str>,
    ) -> Result<GatewaySession, ServiceError> {
        let plan = self
            .catalog
            .find_plan(plan_slug)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Plan '{}' not found", plan_slug)))?;

        let product_id = plan.gateway_product_id.clone().ok_or_else(|| {
            ServiceError::ConfigurationError(format!(
                "Plan '{}' is not linked to a gateway product",
                plan.slug
            ))
        })?;

        let customer_id = self
            .gateway
            .find_or_create_customer(&user.email, user.name.as_deref())
            .await?;

        let prices = self.gateway.list_active_prices(&product_id).await?;
        let current = newest_price_for_interval(&prices, interval).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Plan '{}' has no active {} price",
                plan.slug, interval
            ))
        })?;

        let catalog_amount = to_minor_units(plan_price_for_interval(&plan, interval))?;
        if catalog_amount != current.unit_amount {
            info!(
                plan_slug = %plan.slug,
                gateway_amount = current.unit_amount,
                catalog_amount,
                "price drift detected; scheduling synchronization"
            );
            self.price_sync.spawn(plan.clone(), interval);
        }

        let request = CreateSessionRequest {
            line_items: Vec::new(),
            price_id: Some(current.id.clone()),
            customer_id: Some(customer_id),
            customer_email: None,
            coupon_id: None,
            metadata: BTreeMap::from([
                ("plan_slug".to_string(), plan.slug.clone()),
                ("interval".to_string(), interval.to_string()),
                ("customer_email".to_string(), user.email.clone()),
            ]),
            success_url: return_url
                .map(str::to_string)
                .unwrap_or_else(|| self.config.checkout_success_url.clone()),
            cancel_url: self.config.checkout_cancel_url.clone(),
        };

        let session = self
            .gateway
            .create_checkout_session(SessionMode::Subscription, request)
            .await?;

        self.event_sender
            .send_or_log(Event::CheckoutSessionCreated {
                cart_session_id: None,
                gateway_session_id: session.id.clone(),
                subscription: true,
            })
            .await;
        info!(gateway_session_id = %session.id, plan_slug = %plan.slug, "created subscription checkout session");
        Ok(session)
    }
}

/// One line item per base price, one per priced add-on. Zero-price add-ons
/// are omitted here and surface only in the metadata envelope.
fn build_line_items(items: &[cart_item::Model]) -> Vec<SessionLineItem> {
    let mut line_items = Vec::new();
    for item in items {
        let quantity = item.quantity.max(1) as u32;
        line_items.push(SessionLineItem {
            name: item.title.clone(),
            amount: item.base_price,
            quantity,
        });
        for add_on in item.add_ons() {
            if add_on.price > Decimal::ZERO {
                line_items.push(SessionLineItem {
                    name: format!("{} - {}", item.title, add_on.name),
                    amount: add_on.price,
                    quantity,
                });
            }
        }
    }
    line_items
}

/// Everything a downstream webhook needs to reconstruct the order without
/// re-querying the cart.
fn build_metadata(
    cart: &cart::Model,
    items: &[cart_item::Model],
    discount: Option<&ResolvedDiscount>,
) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("cart_session_id".to_string(), cart.session_id.clone());
    metadata.insert(
        "service_ids".to_string(),
        items
            .iter()
            .map(|i| i.service_id.as_str())
            .collect::<Vec<_>>()
            .join(","),
    );

    let add_on_names: Vec<String> = items
        .iter()
        .flat_map(|item| {
            item.add_ons()
                .into_iter()
                .map(move |a| format!("{}: {}", item.service_id, a.name))
        })
        .collect();
    if !add_on_names.is_empty() {
        metadata.insert("add_ons".to_string(), add_on_names.join("; "));
    }

    if let Some(name) = &cart.contact_name {
        metadata.insert("contact_name".to_string(), name.clone());
    }
    if let Some(email) = &cart.contact_email {
        metadata.insert("contact_email".to_string(), email.clone());
    }
    if let Some(phone) = &cart.contact_phone {
        metadata.insert("contact_phone".to_string(), phone.clone());
    }

    if let Some(address) = cart
        .address
        .as_ref()
        .and_then(|v| serde_json::from_value::<ServiceAddress>(v.clone()).ok())
    {
        if let Some(city) = address.city {
            metadata.insert("address_city".to_string(), city);
        }
        if let Some(state) = address.state {
            metadata.insert("address_state".to_string(), state);
        }
    }

    if let Some(schedule) = cart
        .schedule
        .as_ref()
        .and_then(|v| serde_json::from_value::<ServiceSchedule>(v.clone()).ok())
    {
        metadata.insert("schedule_date".to_string(), schedule.date);
        metadata.insert("schedule_time".to_string(), schedule.time);
    }

    if let Some(discount) = discount {
        metadata.insert("promo_code".to_string(), discount.code.clone());
        metadata.insert(
            "promo_type".to_string(),
            discount.discount_type.to_string(),
        );
        metadata.insert("promo_value".to_string(), discount.value.to_string());
        metadata.insert("promo_source".to_string(), discount.source.to_string());
    }

    metadata
}

/// Most-recently-created active price matching the interval.
fn newest_price_for_interval(
    prices: &[GatewayPrice],
    interval: BillingInterval,
) -> Option<&GatewayPrice> {
    prices
        .iter()
        .filter(|p| p.active && p.interval == Some(interval))
        .max_by_key(|p| p.created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DiscountType;
    use crate::services::promotions::DiscountSource;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn item(service_id: &str, base: Decimal, add_ons: serde_json::Value) -> cart_item::Model {
        let now = Utc::now();
        cart_item::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::new_v4(),
            service_id: service_id.to_string(),
            title: format!("{} service", service_id),
            base_price: base,
            add_ons,
            quantity: 1,
            price: base,
            created_at: now,
            updated_at: now,
        }
    }

    fn bare_cart() -> cart::Model {
        let now = Utc::now();
        cart::Model {
            id: Uuid::new_v4(),
            session_id: "sess-1".into(),
            contact_name: Some("Pat".into()),
            contact_email: Some("pat@example.com".into()),
            contact_phone: None,
            address: Some(serde_json::json!({"city": "Austin", "state": "TX"})),
            schedule: Some(serde_json::json!({"date": "2026-09-01", "time": "10:00"})),
            promo_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn priced_add_ons_become_line_items_zero_priced_do_not() {
        let items = vec![item(
            "tv-mount",
            dec!(100),
            serde_json::json!([
                {"name": "Mesh node", "price": "20"},
                {"name": "Haul-away", "price": "0"}
            ]),
        )];
        let line_items = build_line_items(&items);
        assert_eq!(line_items.len(), 2);
        assert_eq!(line_items[0].amount, dec!(100));
        assert_eq!(line_items[1].name, "tv-mount service - Mesh node");
        assert_eq!(line_items[1].amount, dec!(20));
    }

    #[test]
    fn metadata_envelope_reconstructs_the_order() {
        let items = vec![item(
            "tv-mount",
            dec!(100),
            serde_json::json!([{"name": "Haul-away", "price": "0"}]),
        )];
        let discount = ResolvedDiscount {
            code: "WELCOME10".into(),
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            source: DiscountSource::Merchant,
        };
        let metadata = build_metadata(&bare_cart(), &items, Some(&discount));

        assert_eq!(metadata["cart_session_id"], "sess-1");
        assert_eq!(metadata["service_ids"], "tv-mount");
        assert_eq!(metadata["add_ons"], "tv-mount: Haul-away");
        assert_eq!(metadata["contact_name"], "Pat");
        assert_eq!(metadata["contact_email"], "pat@example.com");
        assert_eq!(metadata["address_city"], "Austin");
        assert_eq!(metadata["address_state"], "TX");
        assert_eq!(metadata["schedule_date"], "2026-09-01");
        assert_eq!(metadata["schedule_time"], "10:00");
        assert_eq!(metadata["promo_code"], "WELCOME10");
        assert_eq!(metadata["promo_type"], "percentage");
        assert_eq!(metadata["promo_value"], "10");
        assert_eq!(metadata["promo_source"], "merchant");
    }

    #[test]
    fn newest_active_price_wins_for_interval() {
        let prices = vec![
            GatewayPrice {
                id: "price_old".into(),
                unit_amount: 2499,
                interval: Some(BillingInterval::Month),
                active: true,
                created: 100,
            },
            GatewayPrice {
                id: "price_new".into(),
                unit_amount: 2999,
                interval: Some(BillingInterval::Month),
                active: true,
                created: 200,
            },
            GatewayPrice {
                id: "price_year".into(),
                unit_amount: 29900,
                interval: Some(BillingInterval::Year),
                active: true,
                created: 300,
            },
            GatewayPrice {
                id: "price_inactive".into(),
                unit_amount: 3999,
                interval: Some(BillingInterval::Month),
                active: false,
                created: 400,
            },
        ];

        let chosen = newest_price_for_interval(&prices, BillingInterval::Month).unwrap();
        assert_eq!(chosen.id, "price_new");
        assert!(newest_price_for_interval(&prices[..1], BillingInterval::Year).is_none());
    }
}

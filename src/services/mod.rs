pub mod cart;
pub mod checkout;
pub mod leads;
pub mod notifications;
pub mod orders;
pub mod price_sync;
pub mod pricing;
pub mod promotions;

use crate::{
    catalog::CatalogClient, config::AppConfig, events::EventSender, gateway::PaymentGateway,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Every service the handlers need, wired once at startup (and once per
/// test harness).
#[derive(Clone)]
pub struct AppServices {
    pub cart: cart::CartService,
    pub pricing: pricing::PricingService,
    pub promotions: promotions::PromotionService,
    pub checkout: checkout::CheckoutService,
    pub price_sync: price_sync::PlanPriceSyncService,
    pub orders: orders::OrderService,
    pub leads: leads::LeadService,
    pub notifications: notifications::NotificationService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn CatalogClient>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let cart = cart::CartService::new(db.clone());
        let pricing = pricing::PricingService::new(db.clone(), catalog.clone());
        let promotions = promotions::PromotionService::new(
            db.clone(),
            catalog.clone(),
            config.clone(),
            event_sender.clone(),
        );
        let price_sync = price_sync::PlanPriceSyncService::new(
            gateway.clone(),
            catalog.clone(),
            event_sender.clone(),
        );
        let checkout = checkout::CheckoutService::new(
            cart.clone(),
            pricing.clone(),
            promotions.clone(),
            price_sync.clone(),
            gateway.clone(),
            catalog.clone(),
            config.clone(),
            event_sender.clone(),
        );
        let orders = orders::OrderService::new(db.clone(), gateway, event_sender.clone());
        let notifications = notifications::NotificationService::new(&config);
        let leads = leads::LeadService::new(db, config, notifications.clone(), event_sender);

        Self {
            cart,
            pricing,
            promotions,
            checkout,
            price_sync,
            orders,
            leads,
            notifications,
        }
    }
}

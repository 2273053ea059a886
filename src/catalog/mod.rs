//! Content repository client.
//!
//! The content repository is the merchant-authored source of truth for
//! service prices, promo codes and subscription plan definitions. The
//! gateway's stored prices are a derived cache of it; any money calculation
//! starts here, never from client-submitted values.

pub mod http;

use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use http::HttpCatalogClient;

/// Discount semantics of a merchant promo code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiscountType {
    /// Value in [0, 100]
    Percentage,
    /// Value in currency units
    Flat,
}

/// Merchant-authored promo code. Multi-use by design: `usage_count` is
/// advisory telemetry, not an enforcement fence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantPromo {
    pub code: String,
    pub active: bool,
    pub expires: Option<DateTime<Utc>>,
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[serde(default)]
    pub usage_count: i64,
}

impl MerchantPromo {
    /// Usable while active and not past its expiry.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.expires.map_or(true, |expires| expires > now)
    }
}

/// Subscription product definition from the content repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingPlan {
    pub slug: String,
    pub title: String,
    /// Monthly price
    pub price: Decimal,
    pub annual_price: Option<Decimal>,
    pub duration: Option<String>,
    pub gateway_product_id: Option<String>,
    pub last_synced_price: Option<Decimal>,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Current authoritative price for a service, or `None` if the service
    /// no longer resolves in the catalog.
    async fn service_price(&self, service_id: &str) -> Result<Option<Decimal>, ServiceError>;

    /// Looks up a merchant promo code.
    async fn find_promo_code(&self, code: &str) -> Result<Option<MerchantPromo>, ServiceError>;

    /// Advisory usage counter bump. Not atomic and not a fence.
    async fn increment_promo_usage(&self, code: &str) -> Result<(), ServiceError>;

    /// Looks up a pricing plan by slug.
    async fn find_plan(&self, slug: &str) -> Result<Option<PricingPlan>, ServiceError>;

    /// Records the price the gateway was converged to.
    async fn update_plan_synced_price(
        &self,
        slug: &str,
        price: Decimal,
    ) -> Result<(), ServiceError>;
}

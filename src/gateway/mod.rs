//! Payment gateway client.
//!
//! The gateway hosts checkout sessions, recurring prices, customers and
//! refunds. It is an eventually-converging replica of the content
//! repository's prices; the catalog always wins on drift.

pub mod stripe;

use crate::catalog::DiscountType;
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

pub use stripe::StripeGateway;

/// Recurring billing interval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BillingInterval {
    #[default]
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionMode {
    Payment,
    Subscription,
}

/// Ad-hoc line item for a one-time purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLineItem {
    pub name: String,
    /// Unit amount in currency units; converted to minor units at the wire
    pub amount: Decimal,
    pub quantity: u32,
}

/// Request to create a hosted checkout session.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionRequest {
    pub line_items: Vec<SessionLineItem>,
    /// Existing gateway price for subscription mode
    pub price_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    /// Single-use coupon to attach
    pub coupon_id: Option<String>,
    /// Envelope a downstream webhook uses to reconstruct the order
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPrice {
    pub id: String,
    pub unit_amount: i64,
    pub interval: Option<BillingInterval>,
    pub active: bool,
    /// Creation timestamp (epoch seconds); newest wins on interval ties
    pub created: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted checkout session and returns its redirect URL.
    async fn create_checkout_session(
        &self,
        mode: SessionMode,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;

    /// Creates a single-use coupon matching a resolved discount.
    async fn create_coupon(
        &self,
        discount_type: DiscountType,
        value: Decimal,
    ) -> Result<String, ServiceError>;

    /// Finds a customer by email or creates one.
    async fn find_or_create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<String, ServiceError>;

    /// Lists the currently active prices for a product.
    async fn list_active_prices(
        &self,
        product_id: &str,
    ) -> Result<Vec<GatewayPrice>, ServiceError>;

    /// Creates a recurring price on a product, in minor units.
    async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        interval: BillingInterval,
    ) -> Result<GatewayPrice, ServiceError>;

    /// Repoints (or clears, with `None`) a product's default price.
    async fn set_default_price(
        &self,
        product_id: &str,
        price_id: Option<&str>,
    ) -> Result<(), ServiceError>;

    async fn deactivate_price(&self, price_id: &str) -> Result<(), ServiceError>;

    /// Payment reference captured by a completed checkout session, if any.
    async fn session_payment_reference(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, ServiceError>;

    /// Refunds a captured payment, returning the refund id.
    async fn create_refund(&self, payment_reference: &str) -> Result<String, ServiceError>;
}

/// Converts a currency-unit amount to gateway minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| {
            ServiceError::InternalError(format!("amount {} out of range for gateway", amount))
        })
}

use super::{
    to_minor_units, BillingInterval, CreateSessionRequest, GatewayPrice, GatewaySession,
    PaymentGateway, SessionMode,
};
use crate::catalog::DiscountType;
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Stripe-backed payment gateway over the form-encoded HTTP API.
///
/// The base URL is configurable so tests can point it at a local mock server.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            currency: currency.into(),
        }
    }

    async fn post_form(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<Value, ServiceError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway: {}", e)))?;

        Self::parse_body(path, response).await
    }

    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, ServiceError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway: {}", e)))?;

        Self::parse_body(path, response).await
    }

    async fn parse_body(path: &str, response: reqwest::Response) -> Result<Value, ServiceError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("gateway body: {}", e)))?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown gateway error");
            debug!(%path, %status, message, "gateway call failed");
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway {} returned {}: {}",
                path, status, message
            )));
        }
        Ok(body)
    }

    fn str_field(body: &Value, field: &str) -> Result<String, ServiceError> {
        body.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::ExternalServiceError(format!(
                    "gateway response missing '{}'",
                    field
                ))
            })
    }

    fn price_from_value(value: &Value) -> Result<GatewayPrice, ServiceError> {
        let interval = value
            .pointer("/recurring/interval")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<BillingInterval>().ok());

        Ok(GatewayPrice {
            id: Self::str_field(value, "id")?,
            unit_amount: value
                .get("unit_amount")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            interval,
            active: value.get("active").and_then(Value::as_bool).unwrap_or(false),
            created: value.get("created").and_then(Value::as_i64).unwrap_or(0),
        })
    }

    fn session_params(
        &self,
        mode: SessionMode,
        request: &CreateSessionRequest,
    ) -> Result<Vec<(String, String)>, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), mode.to_string()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
        ];

        if let Some(customer) = &request.customer_id {
            params.push(("customer".into(), customer.clone()));
        } else if let Some(email) = &request.customer_email {
            params.push(("customer_email".into(), email.clone()));
        }

        match mode {
            SessionMode::Payment => {
                for (i, item) in request.line_items.iter().enumerate() {
                    params.push((
                        format!("line_items[{}][price_data][currency]", i),
                        self.currency.clone(),
                    ));
                    params.push((
                        format!("line_items[{}][price_data][product_data][name]", i),
                        item.name.clone(),
                    ));
                    params.push((
                        format!("line_items[{}][price_data][unit_amount]", i),
                        to_minor_units(item.amount)?.to_string(),
                    ));
                    params.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
                }
            }
            SessionMode::Subscription => {
                let price = request.price_id.as_ref().ok_or_else(|| {
                    ServiceError::InternalError("subscription session requires a price".into())
                })?;
                params.push(("line_items[0][price]".into(), price.clone()));
                params.push(("line_items[0][quantity]".into(), "1".into()));
            }
        }

        if let Some(coupon) = &request.coupon_id {
            params.push(("discounts[0][coupon]".into(), coupon.clone()));
        }

        for (key, value) in &request.metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }

        Ok(params)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request))]
    async fn create_checkout_session(
        &self,
        mode: SessionMode,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let params = self.session_params(mode, &request)?;
        let body = self.post_form("/checkout/sessions", &params).await?;

        Ok(GatewaySession {
            id: Self::str_field(&body, "id")?,
            url: Self::str_field(&body, "url")?,
        })
    }

    #[instrument(skip(self))]
    async fn create_coupon(
        &self,
        discount_type: DiscountType,
        value: Decimal,
    ) -> Result<String, ServiceError> {
        let mut params: Vec<(String, String)> = vec![
            ("duration".into(), "once".into()),
            ("max_redemptions".into(), "1".into()),
        ];
        match discount_type {
            DiscountType::Percentage => {
                params.push(("percent_off".into(), value.to_string()));
            }
            DiscountType::Flat => {
                params.push(("amount_off".into(), to_minor_units(value)?.to_string()));
                params.push(("currency".into(), self.currency.clone()));
            }
        }

        let body = self.post_form("/coupons", &params).await?;
        Self::str_field(&body, "id")
    }

    #[instrument(skip(self))]
    async fn find_or_create_customer(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<String, ServiceError> {
        let body = self
            .get(
                "/customers",
                &[("email".into(), email.into()), ("limit".into(), "1".into())],
            )
            .await?;

        if let Some(existing) = body
            .pointer("/data/0/id")
            .and_then(Value::as_str)
        {
            return Ok(existing.to_string());
        }

        let mut params: Vec<(String, String)> = vec![("email".into(), email.into())];
        if let Some(name) = name {
            params.push(("name".into(), name.into()));
        }
        let created = self.post_form("/customers", &params).await?;
        Self::str_field(&created, "id")
    }

    #[instrument(skip(self))]
    async fn list_active_prices(
        &self,
        product_id: &str,
    ) -> Result<Vec<GatewayPrice>, ServiceError> {
        let body = self
            .get(
                "/prices",
                &[
                    ("product".into(), product_id.into()),
                    ("active".into(), "true".into()),
                    ("limit".into(), "100".into()),
                ],
            )
            .await?;

        body.get("data")
            .and_then(Value::as_array)
            .map(|prices| prices.iter().map(Self::price_from_value).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    #[instrument(skip(self))]
    async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        interval: BillingInterval,
    ) -> Result<GatewayPrice, ServiceError> {
        let params: Vec<(String, String)> = vec![
            ("product".into(), product_id.into()),
            ("unit_amount".into(), unit_amount.to_string()),
            ("currency".into(), self.currency.clone()),
            ("recurring[interval]".into(), interval.to_string()),
        ];

        let body = self.post_form("/prices", &params).await?;
        Self::price_from_value(&body)
    }

    #[instrument(skip(self))]
    async fn set_default_price(
        &self,
        product_id: &str,
        price_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        // An empty value clears the pointer
        let params = vec![(
            "default_price".to_string(),
            price_id.unwrap_or("").to_string(),
        )];
        self.post_form(&format!("/products/{}", product_id), &params)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn deactivate_price(&self, price_id: &str) -> Result<(), ServiceError> {
        let params = vec![("active".to_string(), "false".to_string())];
        self.post_form(&format!("/prices/{}", price_id), &params)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn session_payment_reference(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, ServiceError> {
        let body = self
            .get(&format!("/checkout/sessions/{}", session_id), &[])
            .await?;

        Ok(body
            .get("payment_intent")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    #[instrument(skip(self))]
    async fn create_refund(&self, payment_reference: &str) -> Result<String, ServiceError> {
        let params = vec![("payment_intent".to_string(), payment_reference.to_string())];
        let body = self.post_form("/refunds", &params).await?;
        Self::str_field(&body, "id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SessionLineItem;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn gateway() -> StripeGateway {
        StripeGateway::new("https://api.example.test/v1", "sk_test_mock", "usd")
    }

    #[test]
    fn payment_session_params_expand_line_items() {
        let request = CreateSessionRequest {
            line_items: vec![
                SessionLineItem {
                    name: "Wi-Fi Setup".into(),
                    amount: dec!(100),
                    quantity: 1,
                },
                SessionLineItem {
                    name: "Wi-Fi Setup - Mesh node".into(),
                    amount: dec!(20),
                    quantity: 1,
                },
            ],
            customer_email: Some("a@b.com".into()),
            success_url: "https://shop.example/ok".into(),
            cancel_url: "https://shop.example/cancel".into(),
            ..Default::default()
        };

        let params = gateway()
            .session_params(SessionMode::Payment, &request)
            .unwrap();

        let find = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(find("mode"), Some("payment"));
        assert_eq!(find("customer_email"), Some("a@b.com"));
        assert_eq!(
            find("line_items[0][price_data][unit_amount]"),
            Some("10000")
        );
        assert_eq!(find("line_items[1][price_data][unit_amount]"), Some("2000"));
        assert_eq!(find("line_items[1][quantity]"), Some("1"));
    }

    #[test]
    fn subscription_session_params_use_existing_price() {
        let mut metadata = BTreeMap::new();
        metadata.insert("planSlug".to_string(), "home-care".to_string());

        let request = CreateSessionRequest {
            price_id: Some("price_123".into()),
            customer_id: Some("cus_42".into()),
            metadata,
            success_url: "https://shop.example/ok".into(),
            cancel_url: "https://shop.example/cancel".into(),
            ..Default::default()
        };

        let params = gateway()
            .session_params(SessionMode::Subscription, &request)
            .unwrap();

        assert!(params.contains(&("mode".into(), "subscription".into())));
        assert!(params.contains(&("line_items[0][price]".into(), "price_123".into())));
        assert!(params.contains(&("customer".into(), "cus_42".into())));
        assert!(params.contains(&("metadata[planSlug]".into(), "home-care".into())));
    }

    #[test]
    fn subscription_session_without_price_is_an_internal_error() {
        let request = CreateSessionRequest {
            success_url: "https://shop.example/ok".into(),
            cancel_url: "https://shop.example/cancel".into(),
            ..Default::default()
        };
        let err = gateway()
            .session_params(SessionMode::Subscription, &request)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InternalError(_)));
    }

    #[test]
    fn coupon_attaches_as_discount() {
        let request = CreateSessionRequest {
            line_items: vec![SessionLineItem {
                name: "TV Mounting".into(),
                amount: dec!(80),
                quantity: 1,
            }],
            coupon_id: Some("coupon_once".into()),
            customer_email: Some("a@b.com".into()),
            success_url: "https://shop.example/ok".into(),
            cancel_url: "https://shop.example/cancel".into(),
            ..Default::default()
        };

        let params = gateway()
            .session_params(SessionMode::Payment, &request)
            .unwrap();
        assert!(params.contains(&("discounts[0][coupon]".into(), "coupon_once".into())));
    }
}

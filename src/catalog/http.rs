use super::{CatalogClient, MerchantPromo, PricingPlan};
use crate::errors::ServiceError;
use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::instrument;

/// HTTP client for the content repository's API.
#[derive(Clone)]
pub struct HttpCatalogClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServicePriceBody {
    price: Decimal,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn get_optional<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, ServiceError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("catalog: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "catalog returned {} for {}",
                response.status(),
                path
            )));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("catalog body: {}", e)))?;
        Ok(Some(body))
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    #[instrument(skip(self))]
    async fn service_price(&self, service_id: &str) -> Result<Option<Decimal>, ServiceError> {
        let body: Option<ServicePriceBody> =
            self.get_optional(&format!("/services/{}", service_id)).await?;
        Ok(body.map(|b| b.price))
    }

    #[instrument(skip(self))]
    async fn find_promo_code(&self, code: &str) -> Result<Option<MerchantPromo>, ServiceError> {
        self.get_optional(&format!("/promo-codes/{}", code)).await
    }

    #[instrument(skip(self))]
    async fn increment_promo_usage(&self, code: &str) -> Result<(), ServiceError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/promo-codes/{}/increment-usage", code),
            )
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("catalog: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "catalog usage increment returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_plan(&self, slug: &str) -> Result<Option<PricingPlan>, ServiceError> {
        self.get_optional(&format!("/plans/{}", slug)).await
    }

    #[instrument(skip(self))]
    async fn update_plan_synced_price(
        &self,
        slug: &str,
        price: Decimal,
    ) -> Result<(), ServiceError> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("/plans/{}", slug))
            .json(&json!({ "last_synced_price": price }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("catalog: {}", e)))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "catalog plan update returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

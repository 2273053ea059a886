#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use hometech_api::{
    catalog::{CatalogClient, MerchantPromo, PricingPlan},
    config::AppConfig,
    db::ensure_schema,
    entities::{discount_lead, order},
    errors::ServiceError,
    events::{process_events, EventSender},
    gateway::{
        BillingInterval, CreateSessionRequest, GatewayPrice, GatewaySession, PaymentGateway,
        SessionMode,
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Recording fake for the payment gateway. Every call is captured so tests
/// can assert on exactly what would have gone over the wire.
#[derive(Default)]
pub struct MockGateway {
    counter: AtomicU64,
    pub sessions: Mutex<Vec<(SessionMode, CreateSessionRequest)>>,
    pub coupons: Mutex<Vec<(hometech_api::catalog::DiscountType, Decimal)>>,
    pub customers: Mutex<HashMap<String, String>>,
    pub prices: Mutex<HashMap<String, Vec<GatewayPrice>>>,
    pub default_prices: Mutex<Vec<(String, Option<String>)>>,
    pub payment_refs: Mutex<HashMap<String, Option<String>>>,
    pub refunds: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn with_price(&self, product_id: &str, price: GatewayPrice) {
        self.prices
            .lock()
            .unwrap()
            .entry(product_id.to_string())
            .or_default()
            .push(price);
    }

    pub fn with_payment_ref(&self, session_id: &str, payment_ref: Option<&str>) {
        self.payment_refs
            .lock()
            .unwrap()
            .insert(session_id.to_string(), payment_ref.map(str::to_string));
    }

    pub fn last_session(&self) -> (SessionMode, CreateSessionRequest) {
        self.sessions
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no checkout session was created")
    }

    pub fn created_prices(&self, product_id: &str) -> Vec<GatewayPrice> {
        self.prices
            .lock()
            .unwrap()
            .get(product_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        mode: SessionMode,
        request: CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let n = self.next();
        self.sessions.lock().unwrap().push((mode, request));
        Ok(GatewaySession {
            id: format!("cs_test_{}", n),
            url: format!("https://gateway.test/session/{}", n),
        })
    }

    async fn create_coupon(
        &self,
        discount_type: hometech_api::catalog::DiscountType,
        value: Decimal,
    ) -> Result<String, ServiceError> {
        let n = self.next();
        self.coupons.lock().unwrap().push((discount_type, value));
        Ok(format!("coupon_{}", n))
    }

    async fn find_or_create_customer(
        &self,
        email: &str,
        _name: Option<&str>,
    ) -> Result<String, ServiceError> {
        let mut customers = self.customers.lock().unwrap();
        if let Some(id) = customers.get(email) {
            return Ok(id.clone());
        }
        let id = format!("cus_test_{}", self.next());
        customers.insert(email.to_string(), id.clone());
        Ok(id)
    }

    async fn list_active_prices(
        &self,
        product_id: &str,
    ) -> Result<Vec<GatewayPrice>, ServiceError> {
        Ok(self
            .prices
            .lock()
            .unwrap()
            .get(product_id)
            .map(|prices| prices.iter().filter(|p| p.active).cloned().collect())
            .unwrap_or_default())
    }

    async fn create_price(
        &self,
        product_id: &str,
        unit_amount: i64,
        interval: BillingInterval,
    ) -> Result<GatewayPrice, ServiceError> {
        let n = self.next();
        let price = GatewayPrice {
            id: format!("price_test_{}", n),
            unit_amount,
            interval: Some(interval),
            active: true,
            created: n as i64 + 1_000_000,
        };
        self.prices
            .lock()
            .unwrap()
            .entry(product_id.to_string())
            .or_default()
            .push(price.clone());
        Ok(price)
    }

    async fn set_default_price(
        &self,
        product_id: &str,
        price_id: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.default_prices
            .lock()
            .unwrap()
            .push((product_id.to_string(), price_id.map(str::to_string)));
        Ok(())
    }

    async fn deactivate_price(&self, price_id: &str) -> Result<(), ServiceError> {
        for prices in self.prices.lock().unwrap().values_mut() {
            for price in prices.iter_mut() {
                if price.id == price_id {
                    price.active = false;
                }
            }
        }
        Ok(())
    }

    async fn session_payment_reference(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, ServiceError> {
        Ok(self
            .payment_refs
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .flatten())
    }

    async fn create_refund(&self, payment_reference: &str) -> Result<String, ServiceError> {
        self.refunds
            .lock()
            .unwrap()
            .push(payment_reference.to_string());
        Ok(format!("re_test_{}", self.next()))
    }
}

/// In-memory content repository fake.
#[derive(Default)]
pub struct InMemoryCatalog {
    pub service_prices: Mutex<HashMap<String, Decimal>>,
    pub promos: Mutex<HashMap<String, MerchantPromo>>,
    pub plans: Mutex<HashMap<String, PricingPlan>>,
    pub usage_increments: Mutex<Vec<String>>,
    pub synced_prices: Mutex<HashMap<String, Decimal>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_price(&self, service_id: &str, price: Decimal) {
        self.service_prices
            .lock()
            .unwrap()
            .insert(service_id.to_string(), price);
    }

    pub fn with_promo(&self, promo: MerchantPromo) {
        self.promos
            .lock()
            .unwrap()
            .insert(promo.code.clone(), promo);
    }

    pub fn with_plan(&self, plan: PricingPlan) {
        self.plans.lock().unwrap().insert(plan.slug.clone(), plan);
    }

    pub fn synced_price(&self, slug: &str) -> Option<Decimal> {
        self.synced_prices.lock().unwrap().get(slug).copied()
    }
}

#[async_trait]
impl CatalogClient for InMemoryCatalog {
    async fn service_price(&self, service_id: &str) -> Result<Option<Decimal>, ServiceError> {
        Ok(self.service_prices.lock().unwrap().get(service_id).copied())
    }

    async fn find_promo_code(&self, code: &str) -> Result<Option<MerchantPromo>, ServiceError> {
        Ok(self.promos.lock().unwrap().get(code).cloned())
    }

    async fn increment_promo_usage(&self, code: &str) -> Result<(), ServiceError> {
        self.usage_increments.lock().unwrap().push(code.to_string());
        if let Some(promo) = self.promos.lock().unwrap().get_mut(code) {
            promo.usage_count += 1;
        }
        Ok(())
    }

    async fn find_plan(&self, slug: &str) -> Result<Option<PricingPlan>, ServiceError> {
        Ok(self.plans.lock().unwrap().get(slug).cloned())
    }

    async fn update_plan_synced_price(
        &self,
        slug: &str,
        price: Decimal,
    ) -> Result<(), ServiceError> {
        self.synced_prices
            .lock()
            .unwrap()
            .insert(slug.to_string(), price);
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        jwt_secret: "test_secret_key_for_testing_purposes_only".into(),
        host: "127.0.0.1".into(),
        port: 0,
        environment: "test".into(),
        log_level: "debug".into(),
        log_json: false,
        auto_migrate: true,
        db_max_connections: 1,
        db_min_connections: 1,
        gateway_secret_key: "sk_test_123".into(),
        gateway_api_base: "http://gateway.invalid".into(),
        catalog_api_base: "http://catalog.invalid".into(),
        catalog_api_token: None,
        currency: "usd".into(),
        checkout_success_url: "http://localhost:3000/checkout/success".into(),
        checkout_cancel_url: "http://localhost:3000/checkout".into(),
        shared_lead_code: "MYFIRSTSERVICE".into(),
        default_lead_discount_percent: dec!(10),
        lead_resend_interval_hours: 24,
        crm_webhook_url: None,
        email_webhook_url: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<MockGateway>,
    pub catalog: Arc<InMemoryCatalog>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut AppConfig)) -> Self {
        // A single pooled connection keeps every query on the same
        // in-memory sqlite database
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let db = Arc::new(Database::connect(opts).await.expect("sqlite connect"));
        ensure_schema(&db).await.expect("schema");

        let (event_tx, event_rx) = mpsc::channel(64);
        tokio::spawn(process_events(event_rx));

        let gateway = Arc::new(MockGateway::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let mut config = test_config();
        customize(&mut config);
        let config = Arc::new(config);

        let state = AppState::new(
            db.clone(),
            config,
            Arc::new(EventSender::new(event_tx)),
            gateway.clone(),
            catalog.clone(),
        );
        let router = hometech_api::app_router(state.clone());

        Self {
            router,
            state,
            db,
            gateway,
            catalog,
        }
    }

    pub fn token_for(&self, email: &str) -> String {
        self.state
            .auth
            .issue_token("user-1", email, Some("Test Customer"))
            .expect("issue token")
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        session_id: Option<&str>,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(session_id) = session_id {
            builder = builder.header("x-session-id", session_id);
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    pub async fn seed_order(
        &self,
        email: &str,
        status: &str,
        is_subscription: bool,
        gateway_session_id: Option<&str>,
    ) -> order::Model {
        let now = Utc::now();
        order::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            status: Set(status.to_string()),
            is_subscription: Set(is_subscription),
            gateway_session_id: Set(gateway_session_id.map(str::to_string)),
            refunded: Set(false),
            schedule: Set(Some(
                serde_json::json!({"date": "2026-09-01", "time": "10:00"}),
            )),
            items: Set(serde_json::json!([
                {"service_id": "tv-mount", "schedule": {"date": "2026-09-01", "time": "10:00"}}
            ])),
            total: Set(dec!(120)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed order")
    }

    pub async fn seed_lead(
        &self,
        email_lower: &str,
        code: &str,
        percent: Decimal,
        code_sent_at: DateTime<Utc>,
        redeemed_at: Option<DateTime<Utc>>,
    ) -> discount_lead::Model {
        let now = Utc::now();
        discount_lead::ActiveModel {
            id: Set(Uuid::new_v4()),
            email_lower: Set(email_lower.to_string()),
            phone: Set(None),
            consent: Set(true),
            discount_code: Set(code.to_string()),
            discount_percent: Set(percent),
            code_sent_at: Set(code_sent_at),
            redeemed_at: Set(redeemed_at),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("seed lead")
    }
}

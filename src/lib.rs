//! Checkout orchestration and promotional pricing for the home-tech-support
//! booking platform.
//!
//! The crate owns carts, promo code resolution, hosted checkout session
//! creation, subscription price synchronization and post-purchase order
//! mutations. Page rendering, authentication mechanics and webhook-driven
//! order creation live elsewhere.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod services;

use crate::{
    auth::AuthService, catalog::CatalogClient, config::AppConfig, events::EventSender,
    gateway::PaymentGateway, services::AppServices,
};
use axum::{extract::State, routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: Arc<EventSender>,
    pub auth: AuthService,
    pub gateway: Arc<dyn PaymentGateway>,
    pub catalog: Arc<dyn CatalogClient>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn CatalogClient>,
    ) -> Self {
        let auth = AuthService::new(&config.jwt_secret);
        let services = AppServices::new(
            db.clone(),
            config.clone(),
            gateway.clone(),
            catalog.clone(),
            event_sender.clone(),
        );
        Self {
            db,
            config,
            event_sender,
            auth,
            gateway,
            catalog,
            services,
        }
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn api_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
    }))
}

/// The versioned API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .merge(handlers::checkout::routes())
        .merge(handlers::promotions::routes())
        .merge(handlers::leads::routes())
        .merge(handlers::orders::routes())
        .merge(handlers::cart::routes())
}

/// The full application router with state applied.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .route("/health", get(health_check))
        .with_state(state)
}

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::info;
use validator::Validate;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Application configuration, loaded from defaults, optional config files
/// and `APP__`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT secret used to verify session tokens issued by the auth layer
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Create tables from entities on startup (sqlite/dev only)
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Payment gateway secret key
    pub gateway_secret_key: String,

    /// Payment gateway API base URL (overridable for tests)
    #[serde(default = "default_gateway_api_base")]
    pub gateway_api_base: String,

    /// Content repository API base URL
    pub catalog_api_base: String,

    /// Content repository API token
    #[serde(default)]
    pub catalog_api_token: Option<String>,

    /// Settlement currency for gateway charges
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Redirect target after a successful gateway checkout
    pub checkout_success_url: String,

    /// Redirect target when the customer abandons the gateway checkout
    pub checkout_cancel_url: String,

    /// The shared one-time "first service" promotional code
    #[serde(default = "default_shared_lead_code")]
    pub shared_lead_code: String,

    /// Discount percent applied when a lead row has no stored percent
    #[serde(default = "default_lead_discount_percent")]
    pub default_lead_discount_percent: Decimal,

    /// Minimum hours between discount-code re-sends for the same email
    #[serde(default = "default_lead_resend_interval_hours")]
    pub lead_resend_interval_hours: i64,

    /// Optional CRM sync webhook (best-effort side channel)
    #[serde(default)]
    pub crm_webhook_url: Option<String>,

    /// Optional transactional email webhook (best-effort side channel)
    #[serde(default)]
    pub email_webhook_url: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_gateway_api_base() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_shared_lead_code() -> String {
    "MYFIRSTSERVICE".to_string()
}

fn default_lead_discount_percent() -> Decimal {
    Decimal::from(10)
}

fn default_lead_resend_interval_hours() -> i64 {
    24
}

#[derive(Debug, thiserror::Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret and gateway_secret_key have no defaults on purpose: they
    // must come from the environment or a config file.
    let config = Config::builder()
        .set_default("database_url", "sqlite://hometech.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("catalog_api_base", "http://localhost:3333/api/content")?
        .set_default("checkout_success_url", "http://localhost:3000/checkout/success")?
        .set_default("checkout_cancel_url", "http://localhost:3000/checkout")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}

/// Initialize the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("hometech_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Pricing knobs consumed by the order totals computation. All rates are
/// decimal fractions (0.08 = 8%).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PricingConfig {
    /// Platform commission taken from the order subtotal
    #[serde(default = "default_platform_fee_rate")]
    #[validate(custom = "validate_rate")]
    pub platform_fee_rate: f64,

    /// Sales tax applied to subtotal + delivery fee
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_rate")]
    pub tax_rate: f64,

    /// Flat delivery fee for DELIVERY orders
    #[serde(default = "default_delivery_fee")]
    pub delivery_fee: f64,

    /// Subtotal at which the delivery fee is waived (0 disables the waiver)
    #[serde(default = "default_free_delivery_threshold")]
    pub free_delivery_threshold: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: default_platform_fee_rate(),
            tax_rate: default_tax_rate(),
            delivery_fee: default_delivery_fee(),
            free_delivery_threshold: default_free_delivery_threshold(),
        }
    }
}

impl PricingConfig {
    pub fn platform_fee_rate_decimal(&self) -> Decimal {
        Decimal::try_from(self.platform_fee_rate).unwrap_or_default()
    }

    pub fn tax_rate_decimal(&self) -> Decimal {
        Decimal::try_from(self.tax_rate).unwrap_or_default()
    }

    pub fn delivery_fee_decimal(&self) -> Decimal {
        Decimal::try_from(self.delivery_fee).unwrap_or_default()
    }

    pub fn free_delivery_threshold_decimal(&self) -> Option<Decimal> {
        if self.free_delivery_threshold <= 0.0 {
            return None;
        }
        Decimal::try_from(self.free_delivery_threshold).ok()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(custom = "validate_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// ISO currency code stamped on orders and payments
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Prefix for generated order numbers (`<PREFIX>-<YYYYMMDD>-<seq>`)
    #[serde(default = "default_order_number_prefix")]
    pub order_number_prefix: String,

    /// Money computation rates and fees
    #[serde(default)]
    #[validate]
    pub pricing: PricingConfig,
}

impl AppConfig {
    /// Minimal constructor used by tests and tools.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auto_migrate: true,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            currency: default_currency(),
            order_number_prefix: default_order_number_prefix(),
            pricing: PricingConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
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
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_event_channel_capacity() -> usize {
    1024
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_order_number_prefix() -> String {
    "ORD".to_string()
}
fn default_platform_fee_rate() -> f64 {
    0.10
}
fn default_tax_rate() -> f64 {
    0.08
}
fn default_delivery_fee() -> f64 {
    5.99
}
fn default_free_delivery_threshold() -> f64 {
    0.0
}

fn validate_rate(rate: f64) -> Result<(), ValidationError> {
    if !rate.is_finite() || rate < 0.0 || rate > 1.0 {
        let mut err = ValidationError::new("rate_out_of_range");
        err.message = Some("rate must be a finite value between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_environment(environment: &str) -> Result<(), ValidationError> {
    match environment.to_ascii_lowercase().as_str() {
        "development" | "test" | "staging" | "production" => Ok(()),
        _ => Err(ValidationError::new("unknown_environment")),
    }
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from defaults, `config/{default,<env>}.toml`, and
/// `APP__`-prefixed environment variables (in that order of precedence).
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

    let config = Config::builder()
        .set_default("database_url", "sqlite://farmdirect.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("farmdirect_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

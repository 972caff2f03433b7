use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "CAD";
// Shipping policy: orders at or above the threshold ship free.
const DEFAULT_FREE_SHIPPING_THRESHOLD_CENTS: i64 = 5_000;
const DEFAULT_FLAT_SHIPPING_RATE_CENTS: i64 = 1_000;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_CHECKOUT_RATE_LIMIT: u32 = 10;
const DEFAULT_CART_RATE_LIMIT: u32 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 3_600;

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

    /// Currency code used for all pricing (single-currency storefront)
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Subtotal (minor units) at which shipping becomes free
    #[serde(default = "default_free_shipping_threshold_cents")]
    pub free_shipping_threshold_cents: i64,

    /// Flat shipping rate (minor units) below the free-shipping threshold
    #[serde(default = "default_flat_shipping_rate_cents")]
    pub flat_shipping_rate_cents: i64,

    /// Public storefront URL, used for checkout success/cancel redirects
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Stripe API secret key; checkout-session creation is disabled without it
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Stripe webhook endpoint secret; the webhook endpoint rejects
    /// everything until this is configured
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// Webhook signature/event timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    /// Outbound Stripe API call timeout (seconds)
    #[serde(default = "default_stripe_timeout_secs")]
    pub stripe_api_timeout_secs: u64,

    /// reCAPTCHA v3 secret; bot verification is skipped when unset
    #[serde(default)]
    pub recaptcha_secret_key: Option<String>,

    /// Minimum acceptable reCAPTCHA score
    #[serde(default = "default_recaptcha_threshold")]
    #[validate(custom = "validate_score_threshold")]
    pub recaptcha_score_threshold: f64,

    /// Outbound reCAPTCHA verification timeout (seconds)
    #[serde(default = "default_recaptcha_timeout_secs")]
    pub recaptcha_timeout_secs: u64,

    /// Checkout endpoint: requests allowed per window per client IP
    #[serde(default = "default_checkout_rate_limit")]
    pub checkout_rate_limit_requests: u32,

    /// Checkout endpoint: rate-limit window (seconds)
    #[serde(default = "default_rate_limit_window_secs")]
    pub checkout_rate_limit_window_secs: u64,

    /// Cart endpoint: requests allowed per window per client IP
    #[serde(default = "default_cart_rate_limit")]
    pub cart_rate_limit_requests: u32,

    /// Cart endpoint: rate-limit window (seconds)
    #[serde(default = "default_rate_limit_window_secs")]
    pub cart_rate_limit_window_secs: u64,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
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
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_free_shipping_threshold_cents() -> i64 {
    DEFAULT_FREE_SHIPPING_THRESHOLD_CENTS
}
fn default_flat_shipping_rate_cents() -> i64 {
    DEFAULT_FLAT_SHIPPING_RATE_CENTS
}
fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_stripe_timeout_secs() -> u64 {
    10
}
fn default_recaptcha_threshold() -> f64 {
    0.5
}
fn default_recaptcha_timeout_secs() -> u64 {
    5
}
fn default_checkout_rate_limit() -> u32 {
    DEFAULT_CHECKOUT_RATE_LIMIT
}
fn default_cart_rate_limit() -> u32 {
    DEFAULT_CART_RATE_LIMIT
}
fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_RATE_LIMIT_WINDOW_SECS
}
fn default_event_channel_capacity() -> usize {
    1_024
}

fn validate_score_threshold(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        let mut err = ValidationError::new("recaptcha_score_threshold");
        err.message = Some("recaptcha_score_threshold must be between 0.0 and 1.0".into());
        return Err(err);
    }
    Ok(())
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling; everything else takes
    /// its serde default.
    pub fn new(
        database_url: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            environment: environment.into(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            currency: default_currency(),
            free_shipping_threshold_cents: default_free_shipping_threshold_cents(),
            flat_shipping_rate_cents: default_flat_shipping_rate_cents(),
            public_url: default_public_url(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            stripe_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            stripe_api_timeout_secs: default_stripe_timeout_secs(),
            recaptcha_secret_key: None,
            recaptcha_score_threshold: default_recaptcha_threshold(),
            recaptcha_timeout_secs: default_recaptcha_timeout_secs(),
            checkout_rate_limit_requests: default_checkout_rate_limit(),
            checkout_rate_limit_window_secs: default_rate_limit_window_secs(),
            cart_rate_limit_requests: default_cart_rate_limit(),
            cart_rate_limit_window_secs: default_rate_limit_window_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Loads configuration from `config/{default,<env>}` files layered under
/// `APP__`-prefixed environment variables.
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
        .set_default("database_url", "sqlite://boutique.db?mode=rwc")?
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
        e
    })?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber with env-filter support.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("boutique_api={},tower_http=debug", level);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 18_080, "test");
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.currency, "CAD");
        assert_eq!(cfg.free_shipping_threshold_cents, 5_000);
        assert_eq!(cfg.flat_shipping_rate_cents, 1_000);
        assert_eq!(cfg.checkout_rate_limit_requests, 10);
        assert_eq!(cfg.cart_rate_limit_requests, 100);
        assert!(cfg.is_development());
    }

    #[test]
    fn score_threshold_bounds_are_enforced() {
        let mut cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 18_080, "test");
        cfg.recaptcha_score_threshold = 1.5;
        assert!(cfg.validate().is_err());
        cfg.recaptcha_score_threshold = 0.0;
        assert!(cfg.validate().is_ok());
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::BankAccount;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_DATABASE_URL: &str = "sqlite://storefront.db?mode=rwc";
const DEFAULT_CURRENCY: &str = "NGN";
const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 15;
const DEFAULT_CARD_CHECKOUT_TIMEOUT_SECS: u64 = 900;
const DEFAULT_READ_RETRY_ATTEMPTS: u32 = 2;
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_CART_STORAGE_PATH: &str = "cart.json";
const DEFAULT_NOTIFICATION_ATTEMPTS: u32 = 3;
const DEFAULT_NOTIFICATION_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_FEATURED_PRODUCTS: usize = 4;
const DEFAULT_FEATURED_LIMIT: usize = MAX_FEATURED_PRODUCTS;
const DEFAULT_USSD_TEMPLATE: &str = "*737*000*{amount}#";
const DEFAULT_GATEWAY_BASE_URL: &str = "https://api.paystack.co";
pub const USSD_AMOUNT_PLACEHOLDER: &str = "{amount}";

/// Account details shown to shoppers who pay by bank transfer.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BankConfig {
    #[serde(default)]
    pub bank_name: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub account_name: String,
}

impl BankConfig {
    pub fn account(&self) -> BankAccount {
        BankAccount {
            bank_name: self.bank_name.clone(),
            account_number: self.account_number.clone(),
            account_name: self.account_name.clone(),
        }
    }

    fn is_complete(&self) -> bool {
        [&self.bank_name, &self.account_number, &self.account_name]
            .iter()
            .all(|value| !value.trim().is_empty())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UssdConfig {
    /// Dial string with an `{amount}` placeholder
    #[serde(default = "default_ussd_template")]
    pub code_template: String,
}

impl Default for UssdConfig {
    fn default() -> Self {
        Self {
            code_template: default_ussd_template(),
        }
    }
}

/// Card payment gateway settings
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Public key handed to the client-side widget
    #[serde(default)]
    pub public_key: String,

    /// Secret key for server-side transaction verification
    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Verify successful widget references with the gateway API before
    /// marking a payment completed
    #[serde(default)]
    pub verify_references: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            secret_key: None,
            base_url: default_gateway_base_url(),
            verify_references: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    /// Endpoint receiving order confirmation and contact payloads
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Secret for the HMAC signature header
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Webhook delivery attempts per notification
    #[serde(default = "default_notification_attempts")]
    pub max_attempts: u32,

    /// Pause before the second attempt, doubled for each later one
    #[serde(default = "default_notification_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_secret: None,
            max_attempts: default_notification_attempts(),
            retry_delay_ms: default_notification_retry_delay_ms(),
        }
    }
}

impl NotificationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL for the order/user document store
    #[serde(default = "default_database_url")]
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// ISO 4217 currency code used for all prices
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Bound applied to every repository, provider and notification call
    #[serde(default = "default_network_timeout_secs")]
    #[validate(custom = "validate_positive_secs")]
    pub network_timeout_secs: u64,

    /// How long a card widget may stay open before the attempt counts as abandoned
    #[serde(default = "default_card_checkout_timeout_secs")]
    #[validate(custom = "validate_positive_secs")]
    pub card_checkout_timeout_secs: u64,

    /// Extra attempts for idempotent order reads
    #[serde(default = "default_read_retry_attempts")]
    #[validate(range(max = 5))]
    pub read_retry_attempts: u32,

    /// Event channel capacity for async event processing
    #[serde(default = "default_event_channel_capacity")]
    #[validate(custom = "validate_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// File backing the shopper's cart
    #[serde(default = "default_cart_storage_path")]
    pub cart_storage_path: String,

    /// Number of products on the featured shelf
    #[serde(default = "default_featured_limit")]
    #[validate(range(min = 1, max = 4))]
    pub featured_limit: usize,

    #[serde(default)]
    pub bank: BankConfig,

    #[serde(default)]
    pub ussd: UssdConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            currency: default_currency(),
            network_timeout_secs: default_network_timeout_secs(),
            card_checkout_timeout_secs: default_card_checkout_timeout_secs(),
            read_retry_attempts: default_read_retry_attempts(),
            event_channel_capacity: default_event_channel_capacity(),
            cart_storage_path: default_cart_storage_path(),
            featured_limit: default_featured_limit(),
            bank: BankConfig::default(),
            ussd: UssdConfig::default(),
            gateway: GatewayConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn card_checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.card_checkout_timeout_secs)
    }

    /// Checks that span several fields.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.ussd.code_template.contains(USSD_AMOUNT_PLACEHOLDER) {
            let mut err = ValidationError::new("ussd_code_template");
            err.message = Some("USSD code template must contain an {amount} placeholder".into());
            errors.add("ussd", err);
        }

        if self.gateway.verify_references
            && self
                .gateway
                .secret_key
                .as_deref()
                .map_or(true, |key| key.trim().is_empty())
        {
            let mut err = ValidationError::new("gateway_secret_key_required");
            err.message = Some(
                "Set APP__GATEWAY__SECRET_KEY when gateway reference verification is enabled"
                    .into(),
            );
            errors.add("gateway", err);
        }

        if self.is_production() {
            if self.gateway.public_key.trim().is_empty() {
                let mut err = ValidationError::new("gateway_public_key_required");
                err.message = Some("A gateway public key is required in production".into());
                errors.add("gateway", err);
            }
            if !self.bank.is_complete() {
                let mut err = ValidationError::new("bank_details_required");
                err.message =
                    Some("Bank name, account number and account name are required in production".into());
                errors.add("bank", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Default value functions
fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_network_timeout_secs() -> u64 {
    DEFAULT_NETWORK_TIMEOUT_SECS
}

fn default_notification_attempts() -> u32 {
    DEFAULT_NOTIFICATION_ATTEMPTS
}

fn default_notification_retry_delay_ms() -> u64 {
    DEFAULT_NOTIFICATION_RETRY_DELAY_MS
}

fn default_card_checkout_timeout_secs() -> u64 {
    DEFAULT_CARD_CHECKOUT_TIMEOUT_SECS
}

fn default_read_retry_attempts() -> u32 {
    DEFAULT_READ_RETRY_ATTEMPTS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_cart_storage_path() -> String {
    DEFAULT_CART_STORAGE_PATH.to_string()
}

fn default_featured_limit() -> usize {
    DEFAULT_FEATURED_LIMIT
}

fn default_ussd_template() -> String {
    DEFAULT_USSD_TEMPLATE.to_string()
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_positive_secs(secs: u64) -> Result<(), ValidationError> {
    if secs == 0 {
        let mut err = ValidationError::new("timeout");
        err.message = Some("Timeouts must be at least one second".into());
        return Err(err);
    }
    Ok(())
}

fn validate_event_channel_capacity(capacity: usize) -> Result<(), ValidationError> {
    if capacity == 0 {
        let mut err = ValidationError::new("event_channel_capacity");
        err.message = Some("event_channel_capacity must be greater than 0".into());
        return Err(err);
    }
    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_core={},storefront_cli={}", level, level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Loads configuration from an explicit directory and profile.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let config = Config::builder()
        .set_default("environment", run_env)?
        .add_source(
            File::with_name(&config_dir.join("default").to_string_lossy()).required(false),
        )
        .add_source(File::with_name(&config_dir.join(run_env).to_string_lossy()).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

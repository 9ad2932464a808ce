use config::{Config, ConfigError, Environment, File};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::services::variance::classification::VarianceThresholds;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_HISTORICAL_PERIODS: u64 = 6;

/// Variance calculation tuning. Multipliers are the documented business defaults and may
/// be overridden per deployment.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct VarianceConfig {
    /// |$ variance| above `threshold × multiplier` is critical regardless of the high-value flag
    #[serde(default = "default_critical_dollar_multiplier")]
    #[validate(custom = "validate_multiplier")]
    pub critical_dollar_multiplier: f64,

    /// |qty variance| above `threshold × multiplier` is medium priority
    #[serde(default = "default_medium_quantity_multiplier")]
    #[validate(custom = "validate_multiplier")]
    pub medium_quantity_multiplier: f64,

    /// Single-analysis dollar impact that produces a financial-impact insight
    #[serde(default = "default_large_impact_threshold")]
    pub large_impact_threshold: f64,

    /// Number of closed periods averaged by the historical method
    #[serde(default = "default_historical_periods")]
    #[validate(range(min = 1, max = 52))]
    pub historical_periods: u64,

    /// Confidence attached to recipe based calculations
    #[serde(default = "default_recipe_confidence")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub recipe_confidence: f64,
}

impl Default for VarianceConfig {
    fn default() -> Self {
        Self {
            critical_dollar_multiplier: default_critical_dollar_multiplier(),
            medium_quantity_multiplier: default_medium_quantity_multiplier(),
            large_impact_threshold: default_large_impact_threshold(),
            historical_periods: default_historical_periods(),
            recipe_confidence: default_recipe_confidence(),
        }
    }
}

impl VarianceConfig {
    /// Converts the configured floats into the decimal thresholds used by the engine.
    pub fn thresholds(&self) -> VarianceThresholds {
        let defaults = VarianceThresholds::default();
        VarianceThresholds {
            critical_dollar_multiplier: Decimal::from_f64(self.critical_dollar_multiplier)
                .unwrap_or(defaults.critical_dollar_multiplier),
            medium_quantity_multiplier: Decimal::from_f64(self.medium_quantity_multiplier)
                .unwrap_or(defaults.medium_quantity_multiplier),
            large_impact_threshold: Decimal::from_f64(self.large_impact_threshold)
                .unwrap_or(defaults.large_impact_threshold),
            historical_periods: self.historical_periods,
            recipe_confidence: Decimal::from_f64(self.recipe_confidence)
                .unwrap_or(defaults.recipe_confidence),
        }
    }
}

/// CSV pipeline tuning
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CsvConfig {
    /// Rows per persisted validation batch
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 10000))]
    pub batch_size: usize,

    /// Reject a transform outright when the preflight error rate exceeds this fraction
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_error_rate: Option<f64>,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_error_rate: None,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

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
    #[validate(range(min = 1, max = 100000))]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub variance: VarianceConfig,

    #[serde(default)]
    #[validate]
    pub csv: CsvConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the connection target
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            variance: VarianceConfig::default(),
            csv: CsvConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections must not exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if self.variance.critical_dollar_multiplier < 1.0 {
            let mut err = ValidationError::new("critical_multiplier_too_small");
            err.message = Some("critical_dollar_multiplier must be at least 1.0".into());
            errors.add("variance", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationErrors),
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
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_critical_dollar_multiplier() -> f64 {
    2.0
}
fn default_medium_quantity_multiplier() -> f64 {
    1.5
}
fn default_large_impact_threshold() -> f64 {
    500.0
}
fn default_historical_periods() -> u64 {
    DEFAULT_HISTORICAL_PERIODS
}
fn default_recipe_confidence() -> f64 {
    0.90
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some("log_level must be one of trace, debug, info, warn, error".into());
            Err(err)
        }
    }
}

fn validate_multiplier(value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new("multiplier_must_be_positive"))
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("backoffice_variance={},variance_cli={}", level, level);
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
    load_config_from(CONFIG_DIR)
}

/// Same as [`load_config`] with an explicit configuration directory
pub fn load_config_from(config_dir: &str) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(config_dir).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://variance.db?mode=rwc")?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", config_dir, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::fs;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new("sqlite::memory:".into(), "test".into())
    }

    #[test]
    fn defaults_reproduce_documented_thresholds() {
        let thresholds = base_config().variance.thresholds();
        assert_eq!(thresholds.critical_dollar_multiplier, dec!(2));
        assert_eq!(thresholds.medium_quantity_multiplier, dec!(1.5));
        assert_eq!(thresholds.large_impact_threshold, dec!(500));
        assert_eq!(thresholds.historical_periods, 6);
    }

    #[test]
    fn base_config_passes_validation() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn inverted_pool_bounds_are_rejected() {
        let mut cfg = base_config();
        cfg.db_min_connections = 20;
        cfg.db_max_connections = 2;
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let mut cfg = base_config();
        cfg.log_level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_file_overrides_variance_section() {
        let dir = TempDir::new().expect("temp dir");
        let config_dir = dir.path().join("config");
        fs::create_dir(&config_dir).expect("config dir");
        fs::write(
            config_dir.join("default.toml"),
            r#"
                database_url = "sqlite::memory:"

                [variance]
                critical_dollar_multiplier = 3.0
                historical_periods = 4

                [csv]
                batch_size = 50
            "#,
        )
        .expect("write config");

        let cfg = load_config_from(config_dir.to_str().expect("utf8 path")).expect("loads");
        assert_eq!(cfg.variance.critical_dollar_multiplier, 3.0);
        assert_eq!(cfg.variance.historical_periods, 4);
        assert_eq!(cfg.variance.medium_quantity_multiplier, 1.5);
        assert_eq!(cfg.csv.batch_size, 50);
    }
}

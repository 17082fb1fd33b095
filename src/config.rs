//! Configuration loading and logging setup.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::common::table_reader::TableSpec;
use crate::error::{Result, StatsError};
use crate::forecast::{Strategy, SvrParams};

const DEFAULT_DATABASE_PATH: &str = "greenstats.duckdb";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_HORIZON: i64 = 50;
const ENV_PREFIX: &str = "GREENSTATS";

/// Forecast defaults applied when a request does not override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForecastConfig {
    pub strategy: Strategy,
    /// Steps (days) predicted past the last observation.
    pub horizon: i64,
    pub svr: SvrParams,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::SupportVector,
            horizon: DEFAULT_HORIZON,
            svr: SvrParams::default(),
        }
    }
}

/// Where readings live in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Soil-humidity readings, one entity per bed.
    pub humidity: TableSpec,
    /// Irrigation volume logs, one entity per crop. Every table is merged.
    pub irrigation: Vec<TableSpec>,
    pub cycles_table: String,
    pub crops_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            humidity: TableSpec::new("humidity_readings", "bed_id", "recorded_at", "humidity"),
            irrigation: vec![
                TableSpec::new("manual_irrigation", "crop_id", "started_at", "volume"),
                TableSpec::new("valve_irrigation", "crop_id", "started_at", "volume"),
            ],
            cycles_table: "cycles".to_string(),
            crops_table: "crops".to_string(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// DuckDB database file.
    pub database_path: PathBuf,
    pub log_level: String,
    /// Emit logs as JSON lines.
    pub log_json: bool,
    pub forecast: ForecastConfig,
    pub storage: StorageConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            forecast: ForecastConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl DashboardConfig {
    /// Log where the configuration came from and its main settings. Call
    /// once a subscriber is installed.
    pub fn log_summary(&self, source: Option<&Path>) {
        match source {
            Some(path) => info!("Configuration loaded from {}", path.display()),
            None => info!("Configuration loaded from defaults and environment"),
        }
        info!(
            strategy = %self.forecast.strategy,
            horizon = self.forecast.horizon,
            database = %self.database_path.display(),
            log_level = %self.log_level,
            "Effective configuration"
        );
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(StatsError::InvalidInput(format!(
                "Invalid log_level '{}'. Valid levels: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }
        if self.forecast.horizon <= 0 {
            return Err(StatsError::InvalidHorizon(self.forecast.horizon));
        }
        self.forecast.svr.validate()?;

        self.storage.humidity.validate()?;
        if self.storage.irrigation.is_empty() {
            return Err(StatsError::InvalidInput(
                "at least one irrigation table must be configured".to_string(),
            ));
        }
        for spec in &self.storage.irrigation {
            spec.validate()?;
        }
        if self.storage.cycles_table.is_empty() || self.storage.crops_table.is_empty() {
            return Err(StatsError::InvalidInput(
                "cycles_table and crops_table cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration.
///
/// Layers sources in this order:
/// 1. Built-in defaults
/// 2. The optional config file (format picked from its extension)
/// 3. Environment variables (`GREENSTATS__FORECAST__HORIZON=30`, ...)
pub fn load_config(path: Option<&Path>) -> Result<DashboardConfig> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let dashboard: DashboardConfig = config.try_deserialize()?;
    dashboard.validate()?;
    Ok(dashboard)
}

/// Initializes tracing using the provided log level as the default filter.
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("greenstats={}", level);
    let filter_directive = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

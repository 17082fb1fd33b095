//! Error types shared by the engines, the store and the dashboard use cases.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StatsError>;

/// Failure taxonomy.
///
/// The pure engines only ever produce `InvalidInput`, `InsufficientData` and
/// `InvalidHorizon`; the remaining variants come from the storage and
/// configuration layers.
#[derive(Error, Debug)]
pub enum StatsError {
    /// Malformed date range, unparseable date, unknown entity id.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough observations to fit a forecast.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Forecast horizon must be a positive number of steps.
    #[error("invalid horizon {0}: must be a positive number of steps")]
    InvalidHorizon(i64),

    #[error("storage error: {0}")]
    Storage(#[from] duckdb::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl StatsError {
    /// Short machine-readable kind, used in failure responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StatsError::InvalidInput(_) => "invalid_input",
            StatsError::InsufficientData(_) => "insufficient_data",
            StatsError::InvalidHorizon(_) => "invalid_horizon",
            StatsError::Storage(_) => "storage",
            StatsError::Config(_) => "config",
        }
    }
}

//! Greenhouse statistics: hourly humidity profiles, per-crop irrigation
//! statistics and short-horizon humidity forecasts.
//!
//! The engines in [`aggregation`] and [`forecast`] are pure functions over
//! in-memory readings. [`dashboard`] wires them to a [`ReadingSource`] and
//! shapes the results for the dashboard client.

pub mod aggregation;
pub mod common;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod forecast;

pub use aggregation::{aggregate_by_hour, aggregate_by_key, daily_means, BucketStats, HourlyProfile};
pub use common::table_reader::{CycleCatalog, DuckDbStore, ReadingSource, TableSpec};
pub use common::types::{CycleContext, DateRange, EntityId, ForecastResult, Reading, Series};
pub use config::{init_tracing, load_config, DashboardConfig};
pub use error::{Result, StatsError};
pub use forecast::{ForecastParams, Forecaster, Strategy};

//! Short-horizon trend forecasts over a dense series.
//!
//! Time is treated as a bare integer index: the model sees (0, v0), (1, v1),
//! ... and is evaluated at the indices following the last observation.

pub mod models;
pub mod params;
pub mod svr;

pub use models::{forecast_linear, forecast_svr, Forecaster, LinearFit, Strategy};
pub use params::ForecastParams;
pub use svr::{SvrModel, SvrParams};

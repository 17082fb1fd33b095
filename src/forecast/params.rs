use super::models::{validate_horizon, Forecaster, Strategy};
use super::svr::SvrParams;
use crate::config::ForecastConfig;
use crate::error::Result;

/// Parsed and validated parameters for one forecast request.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastParams {
    pub strategy: Strategy,
    pub horizon: usize,
    pub svr: SvrParams,
}

impl ForecastParams {
    /// Combine optional per-request overrides with the configured defaults.
    pub fn resolve(
        defaults: &ForecastConfig,
        strategy: Option<&str>,
        horizon: Option<i64>,
    ) -> Result<Self> {
        let strategy = match strategy {
            Some(raw) => raw.parse::<Strategy>()?,
            None => defaults.strategy,
        };

        let horizon = validate_horizon(horizon.unwrap_or(defaults.horizon))?;

        defaults.svr.validate()?;

        Ok(ForecastParams {
            strategy,
            horizon,
            svr: defaults.svr,
        })
    }

    pub fn forecaster(&self) -> Forecaster {
        Forecaster::new(self.strategy, self.svr)
    }
}

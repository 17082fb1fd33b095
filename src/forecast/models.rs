use std::fmt;
use std::str::FromStr;

use linregress::{FormulaRegressionBuilder, RegressionDataBuilder};
use serde::{Deserialize, Serialize};

use super::svr::{self, SvrParams};
use crate::common::types::{ForecastResult, Series, MIN_DATA_POINTS};
use crate::error::{Result, StatsError};

/// Which regression is fitted to the (index, value) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Linear,
    SupportVector,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Linear => "linear",
            Strategy::SupportVector => "support_vector",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" | "ols" => Ok(Strategy::Linear),
            "support_vector" | "svr" => Ok(Strategy::SupportVector),
            other => Err(StatsError::InvalidInput(format!(
                "Invalid strategy '{}'. Valid strategies: linear, support_vector",
                other
            ))),
        }
    }
}

/// A forecasting capability. Each call fits a fresh model, extrapolates and
/// drops the model; nothing is cached between calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Forecaster {
    Linear,
    SupportVector(SvrParams),
}

impl Forecaster {
    pub fn new(strategy: Strategy, svr: SvrParams) -> Self {
        match strategy {
            Strategy::Linear => Forecaster::Linear,
            Strategy::SupportVector => Forecaster::SupportVector(svr),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Forecaster::Linear => Strategy::Linear,
            Forecaster::SupportVector(_) => Strategy::SupportVector,
        }
    }

    /// Forecast `horizon` steps past the end of `series`.
    pub fn forecast(&self, series: &Series, horizon: i64) -> Result<ForecastResult> {
        validate_series(series)?;
        let horizon = validate_horizon(horizon)?;
        match self {
            Forecaster::Linear => forecast_linear(series, horizon),
            Forecaster::SupportVector(params) => forecast_svr(series, horizon, params),
        }
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Forecaster::SupportVector(SvrParams::default())
    }
}

/// Reject series that cannot be fitted.
pub fn validate_series(series: &Series) -> Result<()> {
    if series.len() < MIN_DATA_POINTS {
        return Err(StatsError::InsufficientData(format!(
            "Need at least {} data points for forecasting, got {}",
            MIN_DATA_POINTS,
            series.len()
        )));
    }
    if let Some(pos) = series.values().iter().position(|v| !v.is_finite()) {
        return Err(StatsError::InvalidInput(format!(
            "Series value at index {} is not a finite number",
            pos
        )));
    }
    Ok(())
}

/// Convert a requested horizon into a step count, rejecting non-positive values.
pub fn validate_horizon(horizon: i64) -> Result<usize> {
    if horizon <= 0 {
        return Err(StatsError::InvalidHorizon(horizon));
    }
    usize::try_from(horizon).map_err(|_| StatsError::InvalidHorizon(horizon))
}

/// Ordinary least-squares line y = slope * x + intercept.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Fit y ~ x by least squares.
    ///
    /// One point gives a flat line through it. Two points, or a flat y, are
    /// fitted exactly since they leave no residual variance to estimate.
    pub fn fit(x: &[f64], y: &[f64]) -> Result<Self> {
        let n = x.len();
        if n == 0 || n != y.len() {
            return Err(StatsError::InsufficientData(format!(
                "Linear fit needs matching non-empty inputs, got {} x and {} y",
                n,
                y.len()
            )));
        }

        if n == 1 || y.iter().all(|&v| v == y[0]) {
            return Ok(LinearFit {
                slope: 0.0,
                intercept: y[0],
            });
        }
        if n == 2 {
            let run = x[1] - x[0];
            if run == 0.0 {
                return Err(StatsError::InvalidInput(
                    "Linear fit needs at least two distinct x values".to_string(),
                ));
            }
            let slope = (y[1] - y[0]) / run;
            return Ok(LinearFit {
                slope,
                intercept: y[0] - slope * x[0],
            });
        }

        let data = vec![("Y".to_string(), y.to_vec()), ("X".to_string(), x.to_vec())];
        let regression_data = RegressionDataBuilder::new()
            .build_from(data)
            .map_err(|e| StatsError::InvalidInput(format!("Failed to build regression data: {}", e)))?;

        let model = FormulaRegressionBuilder::new()
            .data(&regression_data)
            .formula("Y ~ X")
            .fit()
            .map_err(|e| StatsError::InvalidInput(format!("Linear regression fitting failed: {}", e)))?;

        // parameters() returns [intercept, slope]
        let params = model.parameters();
        Ok(LinearFit {
            slope: params[1],
            intercept: params[0],
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Run linear regression (OLS) forecasting on a series.
///
/// Fits y = intercept + slope * x where x is the 0-based index of each data
/// point and evaluates the line at n, n+1, ..., n+horizon-1.
pub fn forecast_linear(series: &Series, horizon: usize) -> Result<ForecastResult> {
    validate_series(series)?;
    let model = LinearFit::fit(&series.indices(), series.values())?;
    Ok(extrapolate(series.len(), horizon, |x| model.predict(x)))
}

/// Run support-vector regression forecasting on a series.
pub fn forecast_svr(series: &Series, horizon: usize, params: &SvrParams) -> Result<ForecastResult> {
    validate_series(series)?;
    let model = svr::fit(&series.indices(), series.values(), params)?;
    Ok(extrapolate(series.len(), horizon, |x| model.predict(x)))
}

fn extrapolate<F>(n: usize, horizon: usize, predict: F) -> ForecastResult
where
    F: Fn(f64) -> f64,
{
    let forecasts = (n..n + horizon).map(|i| predict(i as f64)).collect();
    ForecastResult {
        start_index: n,
        forecasts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn both() -> [Forecaster; 2] {
        [Forecaster::Linear, Forecaster::SupportVector(SvrParams::default())]
    }

    #[test]
    fn test_linear_exact_trend() {
        let series = Series::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let result = Forecaster::Linear.forecast(&series, 3).unwrap();
        assert_eq!(result.start_index, 5);
        for (got, want) in result.forecasts.iter().zip([6.0, 7.0, 8.0]) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_linear_single_point_is_constant() {
        let series = Series::from(vec![42.0]);
        let result = Forecaster::Linear.forecast(&series, 3).unwrap();
        assert_eq!(result.forecasts, vec![42.0, 42.0, 42.0]);
    }

    #[test]
    fn test_single_point_any_strategy() {
        let series = Series::from(vec![42.0]);
        for forecaster in both() {
            let result = forecaster.forecast(&series, 3).unwrap();
            assert_eq!(result.len(), 3);
            for v in &result.forecasts {
                assert!((v - 42.0).abs() < 1e-9, "{}: {}", forecaster.strategy(), v);
            }
        }
    }

    #[test]
    fn test_empty_series_is_insufficient() {
        let series = Series::default();
        for forecaster in both() {
            let err = forecaster.forecast(&series, 5).unwrap_err();
            assert!(matches!(err, StatsError::InsufficientData(_)), "{}", err);
        }
    }

    #[test]
    fn test_non_positive_horizon_rejected() {
        let series = Series::from(vec![1.0, 2.0, 3.0]);
        for forecaster in both() {
            assert!(matches!(
                forecaster.forecast(&series, 0),
                Err(StatsError::InvalidHorizon(0))
            ));
            assert!(matches!(
                forecaster.forecast(&series, -1),
                Err(StatsError::InvalidHorizon(-1))
            ));
        }
    }

    #[test]
    fn test_result_length_matches_horizon() {
        let series = Series::from((0..12).map(|i| 40.0 + (i as f64 * 0.9).sin()).collect::<Vec<_>>());
        for forecaster in both() {
            for horizon in [1, 30, 50] {
                let result = forecaster.forecast(&series, horizon).unwrap();
                assert_eq!(result.len(), horizon as usize);
                assert_eq!(result.start_index, 12);
            }
        }
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let series = Series::from(vec![1.0, f64::NAN, 3.0]);
        assert!(matches!(
            Forecaster::Linear.forecast(&series, 2),
            Err(StatsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_strategies_agree_on_trend_direction() {
        // Drying bed: humidity falls roughly 0.6 points per day
        let values: Vec<f64> = (0..15)
            .map(|i| 62.0 - 0.6 * i as f64 + (i as f64 * 1.7).cos() * 0.4)
            .collect();
        let series = Series::from(values.clone());
        let last = *values.last().unwrap();
        for forecaster in both() {
            let result = forecaster.forecast(&series, 10).unwrap();
            assert!(result.forecasts[9] < last, "{} should keep falling", forecaster.strategy());
            for w in result.forecasts.windows(2) {
                assert!(w[1] < w[0]);
            }
        }
    }

    #[test]
    fn test_linear_fit_noisy_trend() {
        let x: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let y = vec![50.0, 51.5, 51.0, 53.5, 53.0, 55.0];
        let fit = LinearFit::fit(&x, &y).unwrap();
        // Sxy = 16, Sxx = 17.5, mean(x) = 2.5, mean(y) = 157 / 3
        let slope = 16.0 / 17.5;
        assert_relative_eq!(fit.slope, slope, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 157.0 / 3.0 - slope * 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_linear_fit_flat_series() {
        let fit = LinearFit::fit(&[0.0, 1.0, 2.0], &[42.0, 42.0, 42.0]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.predict(10.0), 42.0);
    }

    #[test]
    fn test_linear_fit_two_points() {
        let fit = LinearFit::fit(&[0.0, 1.0], &[10.0, 14.0]).unwrap();
        assert_eq!(fit.slope, 4.0);
        assert_eq!(fit.intercept, 10.0);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("linear".parse::<Strategy>().unwrap(), Strategy::Linear);
        assert_eq!(" SVR ".parse::<Strategy>().unwrap(), Strategy::SupportVector);
        assert_eq!(
            "support_vector".parse::<Strategy>().unwrap(),
            Strategy::SupportVector
        );
        assert!(matches!("ets".parse::<Strategy>(), Err(StatsError::InvalidInput(_))));
        assert_eq!(
            Forecaster::new(Strategy::Linear, SvrParams::default()).strategy(),
            Strategy::Linear
        );
    }
}

//! Dashboard use cases.
//!
//! Each function takes raw request parameters plus an explicit data source
//! and returns the payload of one dashboard view. [`Response`] wraps the
//! payload (or the failure) in the `{ success, ... }` envelope clients expect.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregation::{aggregate_by_hour, aggregate_by_key, daily_means};
use crate::common::params::{parse_date_range, parse_entity_id, require};
use crate::common::table_reader::{CycleCatalog, ReadingSource};
use crate::common::types::{CycleContext, DateRange, EntityId};
use crate::error::{Result, StatsError};
use crate::forecast::{ForecastParams, Strategy};

/// A bed and date range as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    #[serde(alias = "camaId", alias = "bedId")]
    pub bed_id: Option<String>,
    #[serde(alias = "fechaInicio", alias = "startDate")]
    pub start_date: Option<String>,
    #[serde(alias = "fechaFin", alias = "endDate")]
    pub end_date: Option<String>,
}

impl RangeRequest {
    pub fn new(bed_id: &str, start_date: &str, end_date: &str) -> Self {
        Self {
            bed_id: Some(bed_id.to_string()),
            start_date: Some(start_date.to_string()),
            end_date: Some(end_date.to_string()),
        }
    }

    fn parse(&self) -> Result<(EntityId, DateRange)> {
        let bed = parse_entity_id("bed_id", require("bed_id", self.bed_id.as_deref())?)?;
        let range = parse_date_range(
            require("start_date", self.start_date.as_deref())?,
            require("end_date", self.end_date.as_deref())?,
        )?;
        Ok((bed, range))
    }
}

/// `{ success: true, ...payload }` or `{ success: false, message, error }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<T> {
    pub success: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        }
    }

    pub fn failure(err: &StatsError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(err.to_string()),
            error: Some(err.kind()),
        }
    }

    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(&err),
        }
    }
}

/// Hour-of-day humidity profile, 24 entries per array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyHumidity {
    #[serde(rename = "promedios")]
    pub means: Vec<f64>,
    #[serde(rename = "maximos")]
    pub maxima: Vec<f64>,
    #[serde(rename = "minimos")]
    pub minima: Vec<f64>,
    #[serde(rename = "desviaciones")]
    pub stddevs: Vec<f64>,
}

/// Build the hourly humidity profile of one bed.
pub fn hourly_humidity<S>(source: &S, request: &RangeRequest) -> Result<HourlyHumidity>
where
    S: ReadingSource + ?Sized,
{
    let (bed, range) = request.parse()?;
    let readings = source.readings(bed, &range)?;
    debug!(bed, readings = readings.len(), "Aggregating humidity by hour");

    let profile = aggregate_by_hour(&readings, &range);
    Ok(HourlyHumidity {
        means: profile.means(),
        maxima: profile.maxima(),
        minima: profile.minima(),
        stddevs: profile.stddevs(),
    })
}

/// One historical point of a prediction chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverage {
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "promedio_humedad")]
    pub mean_humidity: f64,
}

/// Daily history and its forecast continuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    #[serde(rename = "datos_historicos")]
    pub history: Vec<DailyAverage>,
    #[serde(rename = "predicciones")]
    pub forecasts: Vec<f64>,
    /// Calendar labels for the forecast steps.
    #[serde(rename = "fechas_prediccion")]
    pub forecast_dates: Vec<NaiveDate>,
    #[serde(rename = "modelo")]
    pub strategy: Strategy,
}

/// Forecast the daily mean humidity of one bed.
///
/// Readings are reduced to one mean per day; days without readings are
/// skipped, so the model index counts observed days, not calendar days.
pub fn predict_humidity<S>(
    source: &S,
    request: &RangeRequest,
    params: &ForecastParams,
) -> Result<Prediction>
where
    S: ReadingSource + ?Sized,
{
    let (bed, range) = request.parse()?;
    if range.is_empty() {
        return Err(StatsError::InvalidInput(format!(
            "start date {} cannot be after end date {}",
            range.start, range.end
        )));
    }

    let readings = source.readings(bed, &range)?;
    let daily = daily_means(&readings, &range);
    if daily.is_empty() {
        return Err(StatsError::InsufficientData(format!(
            "no readings for bed {} between {} and {}",
            bed, range.start, range.end
        )));
    }

    let forecaster = params.forecaster();
    let result = forecaster.forecast(&daily.to_series(), params.horizon as i64)?;
    info!(
        bed,
        days = daily.len(),
        horizon = params.horizon,
        strategy = %forecaster.strategy(),
        "Humidity forecast computed"
    );

    let history = daily
        .dates
        .iter()
        .zip(&daily.values)
        .map(|(date, value)| DailyAverage {
            date: *date,
            mean_humidity: *value,
        })
        .collect();

    Ok(Prediction {
        history,
        forecast_dates: daily.future_dates(result.len()),
        forecasts: result.into_values(),
        strategy: forecaster.strategy(),
    })
}

/// Irrigation volume statistics of one crop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropMetrics {
    #[serde(rename = "cultivo_id")]
    pub crop_id: EntityId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "eventos")]
    pub events: usize,
    #[serde(rename = "promedio")]
    pub mean: f64,
    #[serde(rename = "maximo")]
    pub max: f64,
    #[serde(rename = "minimo")]
    pub min: f64,
    #[serde(rename = "desviacion")]
    pub stddev: f64,
}

/// Chart series, one entry per crop in crop-name order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrrigationChart {
    pub labels: Vec<String>,
    #[serde(rename = "promedios")]
    pub means: Vec<f64>,
    #[serde(rename = "maximos")]
    pub maxima: Vec<f64>,
    #[serde(rename = "minimos")]
    pub minima: Vec<f64>,
    #[serde(rename = "desviaciones")]
    pub stddevs: Vec<f64>,
    #[serde(rename = "descripcion_ciclo")]
    pub cycle_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrrigationReport {
    #[serde(rename = "ciclo")]
    pub cycle: CycleContext,
    #[serde(rename = "metricas")]
    pub metrics: Vec<CropMetrics>,
    #[serde(rename = "grafico")]
    pub chart: IrrigationChart,
}

/// Per-crop irrigation statistics for a cycle.
///
/// Every crop of the cycle appears, with zeros if it was never irrigated
/// between the cycle's start and end dates.
pub fn irrigation_statistics<C, S>(catalog: &C, source: &S, cycle: &CycleContext) -> Result<IrrigationReport>
where
    C: CycleCatalog + ?Sized,
    S: ReadingSource + ?Sized,
{
    let crops = catalog.crops(cycle.id)?;
    let crop_ids: Vec<EntityId> = crops.iter().map(|c| c.id).collect();

    let events = source.tagged_readings(&crop_ids, &cycle.range())?;
    debug!(cycle = cycle.id, crops = crops.len(), events = events.len(), "Aggregating irrigation");

    let stats = aggregate_by_key(&events, |t| t.entity_id, crop_ids.iter().copied());

    let metrics: Vec<CropMetrics> = crops
        .iter()
        .map(|crop| {
            let s = stats.get(&crop.id).copied().unwrap_or_default();
            CropMetrics {
                crop_id: crop.id,
                name: crop.name.clone(),
                events: s.count,
                mean: s.mean,
                max: s.max,
                min: s.min,
                stddev: s.stddev,
            }
        })
        .collect();

    let chart = IrrigationChart {
        labels: metrics.iter().map(|m| m.name.clone()).collect(),
        means: metrics.iter().map(|m| m.mean).collect(),
        maxima: metrics.iter().map(|m| m.max).collect(),
        minima: metrics.iter().map(|m| m.min).collect(),
        stddevs: metrics.iter().map(|m| m.stddev).collect(),
        cycle_description: cycle.description.clone(),
    };

    Ok(IrrigationReport {
        cycle: cycle.clone(),
        metrics,
        chart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::table_reader::{DuckDbStore, TableSource, TableSpec};
    use crate::config::ForecastConfig;
    use approx::assert_relative_eq;

    fn seeded() -> DuckDbStore {
        let store = DuckDbStore::open_in_memory().unwrap();
        store.init_schema().unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO cycles VALUES (3, 'Winter greens', DATE '2024-01-01', DATE '2024-01-31');
                 INSERT INTO crops VALUES (1, 3, 'Spinach'), (2, 3, 'Arugula'), (3, 3, 'Chard');
                 INSERT INTO humidity_readings VALUES
                    (4, TIMESTAMP '2024-01-01 06:00:00', 40.0),
                    (4, TIMESTAMP '2024-01-01 18:00:00', 44.0),
                    (4, TIMESTAMP '2024-01-02 06:00:00', 43.0),
                    (4, TIMESTAMP '2024-01-02 18:00:00', 47.0),
                    (4, TIMESTAMP '2024-01-04 06:00:00', 46.0),
                    (4, TIMESTAMP '2024-01-04 18:00:00', 50.0);
                 INSERT INTO manual_irrigation VALUES
                    (1, TIMESTAMP '2024-01-03 07:00:00', TIMESTAMP '2024-01-03 07:15:00', 10.0),
                    (2, TIMESTAMP '2024-02-10 07:00:00', NULL, 80.0);
                 INSERT INTO valve_irrigation VALUES
                    (1, TIMESTAMP '2024-01-05 07:00:00', 30.0),
                    (2, TIMESTAMP '2024-01-06 07:00:00', 25.0);",
            )
            .unwrap();
        store
    }

    fn humidity(store: &DuckDbStore) -> TableSource<'_> {
        store.source(vec![TableSpec::new("humidity_readings", "bed_id", "recorded_at", "humidity")])
    }

    fn linear(horizon: i64) -> ForecastParams {
        ForecastParams::resolve(&ForecastConfig::default(), Some("linear"), Some(horizon)).unwrap()
    }

    #[test]
    fn test_hourly_humidity_has_24_entries() {
        let store = seeded();
        let request = RangeRequest::new("4", "2024-01-01", "2024-01-31");
        let hourly = hourly_humidity(&humidity(&store), &request).unwrap();

        assert_eq!(hourly.means.len(), 24);
        assert_eq!(hourly.minima.len(), 24);
        assert_relative_eq!(hourly.means[6], 43.0);
        assert_eq!(hourly.minima[6], 40.0);
        assert_eq!(hourly.maxima[18], 50.0);
        assert_eq!(hourly.means[0], 0.0);
    }

    #[test]
    fn test_hourly_humidity_inverted_range_is_all_zero() {
        let store = seeded();
        let request = RangeRequest::new("4", "2024-01-31", "2024-01-01");
        let hourly = hourly_humidity(&humidity(&store), &request).unwrap();
        assert!(hourly.means.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_hourly_humidity_invalid_requests() {
        let store = seeded();
        let source = humidity(&store);

        let unknown_bed = RangeRequest::new("9", "2024-01-01", "2024-01-31");
        assert!(matches!(
            hourly_humidity(&source, &unknown_bed),
            Err(StatsError::InvalidInput(_))
        ));

        let bad_date = RangeRequest::new("4", "not-a-date", "2024-01-31");
        assert!(matches!(
            hourly_humidity(&source, &bad_date),
            Err(StatsError::InvalidInput(_))
        ));

        let missing = RangeRequest {
            bed_id: Some("4".to_string()),
            ..RangeRequest::default()
        };
        assert!(matches!(
            hourly_humidity(&source, &missing),
            Err(StatsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_predict_humidity_linear() {
        let store = seeded();
        let request = RangeRequest::new("4", "2024-01-01", "2024-01-31");
        let prediction = predict_humidity(&humidity(&store), &request, &linear(3)).unwrap();

        // Daily means 42, 45, 48 on observed days 1, 2 and 4
        let means: Vec<f64> = prediction.history.iter().map(|d| d.mean_humidity).collect();
        assert_eq!(means, vec![42.0, 45.0, 48.0]);
        assert_eq!(prediction.forecasts.len(), 3);
        assert_relative_eq!(prediction.forecasts[0], 51.0, epsilon = 1e-9);
        assert_relative_eq!(prediction.forecasts[2], 57.0, epsilon = 1e-9);
        assert_eq!(prediction.forecast_dates.len(), 3);
        assert_eq!(prediction.strategy, Strategy::Linear);
    }

    #[test]
    fn test_predict_humidity_default_support_vector() {
        let store = seeded();
        let request = RangeRequest::new("4", "2024-01-01", "2024-01-31");
        let params = ForecastParams::resolve(&ForecastConfig::default(), None, None).unwrap();
        let prediction = predict_humidity(&humidity(&store), &request, &params).unwrap();

        assert_eq!(prediction.strategy, Strategy::SupportVector);
        assert_eq!(prediction.history.len(), 3);
        assert_eq!(prediction.forecasts.len(), 50);
        assert_eq!(prediction.forecast_dates.len(), 50);

        // Gaps of 1 and 2 days tie; the daily step wins
        let first = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(prediction.forecast_dates[0], first);
        assert_eq!(prediction.forecast_dates[49], first + chrono::Duration::days(49));

        // Regularized slope: half a point per observed day from 44.5
        assert_relative_eq!(prediction.forecasts[0], 46.0, epsilon = 1e-6);
        assert_relative_eq!(prediction.forecasts[49], 70.5, epsilon = 1e-6);
        for w in prediction.forecasts.windows(2) {
            assert!(w[1] > w[0]);
        }

        let json = serde_json::to_value(Response::ok(prediction)).unwrap();
        assert_eq!(json["modelo"], "support_vector");
        assert_eq!(json["predicciones"].as_array().unwrap().len(), 50);
        assert_eq!(json["fechas_prediccion"][0], "2024-01-05");
    }

    #[test]
    fn test_predict_humidity_failures() {
        let store = seeded();
        let source = humidity(&store);

        let inverted = RangeRequest::new("4", "2024-01-31", "2024-01-01");
        assert!(matches!(
            predict_humidity(&source, &inverted, &linear(3)),
            Err(StatsError::InvalidInput(_))
        ));

        let empty = RangeRequest::new("4", "2024-03-01", "2024-03-31");
        assert!(matches!(
            predict_humidity(&source, &empty, &linear(3)),
            Err(StatsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_irrigation_statistics_covers_every_crop() {
        let store = seeded();
        let catalog = store.catalog("cycles", "crops");
        let source = store.source(vec![
            TableSpec::new("manual_irrigation", "crop_id", "started_at", "volume"),
            TableSpec::new("valve_irrigation", "crop_id", "started_at", "volume"),
        ]);

        let cycle = catalog.cycle(3).unwrap();
        let report = irrigation_statistics(&catalog, &source, &cycle).unwrap();

        assert_eq!(report.chart.labels, vec!["Arugula", "Chard", "Spinach"]);
        assert_eq!(report.chart.cycle_description, "Winter greens");

        let arugula = &report.metrics[0];
        // The February event falls outside the cycle
        assert_eq!(arugula.events, 1);
        assert_eq!(arugula.mean, 25.0);
        assert_eq!(arugula.stddev, 0.0);

        let chard = &report.metrics[1];
        assert_eq!(chard.events, 0);
        assert_eq!((chard.mean, chard.min, chard.max, chard.stddev), (0.0, 0.0, 0.0, 0.0));

        let spinach = &report.metrics[2];
        assert_eq!(spinach.events, 2);
        assert_relative_eq!(spinach.mean, 20.0);
        assert_relative_eq!(spinach.stddev, 10.0);
        assert_eq!(report.chart.maxima, vec![25.0, 0.0, 30.0]);
    }

    #[test]
    fn test_response_envelope() {
        let ok = Response::ok(HourlyHumidity {
            means: vec![1.0],
            maxima: vec![2.0],
            minima: vec![0.5],
            stddevs: vec![0.0],
        });
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["promedios"][0], 1.0);
        assert!(json.get("message").is_none());

        let failed: Response<HourlyHumidity> =
            Response::from_result(Err(StatsError::InvalidHorizon(0)));
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "invalid_horizon");
        assert!(json.get("promedios").is_none());
    }

    #[test]
    fn test_request_accepts_client_field_names() {
        let request: RangeRequest = serde_json::from_str(
            r#"{"camaId": "2", "fechaInicio": "2024-01-01", "fechaFin": "2024-01-07"}"#,
        )
        .unwrap();
        assert_eq!(request, RangeRequest::new("2", "2024-01-01", "2024-01-07"));
    }
}

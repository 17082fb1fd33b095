use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Minimum number of observations required to fit a forecast.
pub const MIN_DATA_POINTS: usize = 1;

/// Number of hour-of-day buckets.
pub const HOURS_PER_DAY: usize = 24;

/// Identifier of a bed or crop in the store.
pub type EntityId = i64;

/// A single sensor or irrigation-volume observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl Reading {
    pub fn new(timestamp: NaiveDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Hour-of-day component, 0..=23.
    pub fn hour(&self) -> usize {
        self.timestamp.hour() as usize
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Calendar-date range, inclusive at both ends.
///
/// A range whose start is after its end is allowed and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Returns true if no date can fall inside the range.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Returns true if the timestamp's date lies within the range.
    pub fn contains(&self, timestamp: &NaiveDateTime) -> bool {
        let date = timestamp.date();
        self.start <= date && date <= self.end
    }
}

/// The crop cycle a request is scoped to, passed explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleContext {
    pub id: EntityId,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CycleContext {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}

/// A crop planted during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crop {
    pub id: EntityId,
    pub name: String,
}

/// A dense, zero-indexed sequence of observations, one per time step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    values: Vec<f64>,
}

impl Series {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// Returns the number of data points.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the series has no data points.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The index positions 0..n-1 as regression inputs.
    pub fn indices(&self) -> Vec<f64> {
        (0..self.values.len()).map(|i| i as f64).collect()
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

/// Daily means in date order. Days without observations are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl DailySeries {
    /// Returns the number of days with data.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the last date, or None if empty.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Drops the calendar and keeps the values as a dense series.
    pub fn to_series(&self) -> Series {
        Series::new(self.values.clone())
    }

    /// Calendar labels for `horizon` steps after the last observed date,
    /// spaced by the most common gap between observed dates.
    pub fn future_dates(&self, horizon: usize) -> Vec<NaiveDate> {
        let Some(last) = self.last_date() else {
            return Vec::new();
        };
        let interval = detect_interval(&self.dates);
        (1..=horizon as i64)
            .filter_map(|i| last.checked_add_signed(Duration::days(i * interval)))
            .collect()
    }
}

/// The values predicted for the steps following a series.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastResult {
    /// Series index of the first forecast value (the length of the input).
    pub start_index: usize,
    /// Point forecasts for `start_index`, `start_index + 1`, ...
    pub forecasts: Vec<f64>,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.forecasts
    }
}

/// Most common gap, in days, between consecutive dates.
///
/// Ties go to the smaller gap. Falls back to 1 (daily) when there are fewer
/// than two dates or no positive gap.
pub fn detect_interval(dates: &[NaiveDate]) -> i64 {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for pair in dates.windows(2) {
        let gap = (pair[1] - pair[0]).num_days();
        if gap > 0 {
            *counts.entry(gap).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .fold(None, |best: Option<(i64, usize)>, (gap, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((gap, count)),
        })
        .map_or(1, |(gap, _)| gap)
}

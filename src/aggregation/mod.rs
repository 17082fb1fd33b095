//! Bucketing and descriptive statistics over readings.
//!
//! Every function here is pure. Buckets declared in the key universe are
//! always present in the output; buckets without observations carry the
//! zero default of [`BucketStats`].

pub mod stats;

use std::collections::BTreeMap;

use serde::Serialize;
use statrs::statistics::Statistics;

use crate::common::grouping::{group_values, Observation};
use crate::common::types::{DailySeries, DateRange, Reading, HOURS_PER_DAY};
pub use stats::BucketStats;

/// Statistics for each hour of the day, 0 through 23.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyProfile {
    buckets: [BucketStats; HOURS_PER_DAY],
}

impl HourlyProfile {
    /// Statistics for `hour`, or None if `hour > 23`.
    pub fn get(&self, hour: usize) -> Option<&BucketStats> {
        self.buckets.get(hour)
    }

    pub fn buckets(&self) -> &[BucketStats] {
        &self.buckets
    }

    pub fn means(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.mean).collect()
    }

    pub fn maxima(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.max).collect()
    }

    pub fn minima(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.min).collect()
    }

    pub fn stddevs(&self) -> Vec<f64> {
        self.buckets.iter().map(|b| b.stddev).collect()
    }
}

/// Aggregate readings by the hour component of their timestamp.
///
/// Only readings whose date falls inside `range` (inclusive) are counted.
/// An inverted range matches nothing and yields the all-zero profile.
pub fn aggregate_by_hour(readings: &[Reading], range: &DateRange) -> HourlyProfile {
    let in_range: Vec<Reading> = readings
        .iter()
        .filter(|r| range.contains(&r.timestamp))
        .copied()
        .collect();

    let groups = group_values(&in_range, Reading::hour);

    let mut buckets = [BucketStats::default(); HOURS_PER_DAY];
    for (hour, values) in &groups {
        if let Some(bucket) = buckets.get_mut(*hour) {
            *bucket = BucketStats::from_values(values);
        }
    }

    HourlyProfile { buckets }
}

/// Aggregate observations by an arbitrary key.
///
/// The output has exactly one entry per key in `universe`. Observations whose
/// key is not part of the universe are ignored.
pub fn aggregate_by_key<T, K, F, I>(items: &[T], key_of: F, universe: I) -> BTreeMap<K, BucketStats>
where
    T: Observation,
    K: Ord,
    F: Fn(&T) -> K,
    I: IntoIterator<Item = K>,
{
    let mut groups = group_values(items, key_of);

    universe
        .into_iter()
        .map(|key| {
            let stats = groups
                .remove(&key)
                .map(|values| BucketStats::from_values(&values))
                .unwrap_or_default();
            (key, stats)
        })
        .collect()
}

/// Reduce readings to one mean per calendar day, in date order.
///
/// Days inside `range` without readings are absent from the result rather
/// than filled.
pub fn daily_means(readings: &[Reading], range: &DateRange) -> DailySeries {
    let in_range: Vec<Reading> = readings
        .iter()
        .filter(|r| range.contains(&r.timestamp))
        .copied()
        .collect();

    let groups = group_values(&in_range, Reading::date);

    let mut daily = DailySeries::default();
    for (date, values) in groups {
        daily.dates.push(date);
        daily.values.push(values.mean());
    }
    daily
}

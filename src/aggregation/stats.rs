use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Descriptive statistics for one bucket.
///
/// An empty bucket reports zero for every field rather than NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    /// Number of observations in the bucket.
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation (divides by n, not n - 1).
    pub stddev: f64,
}

impl BucketStats {
    /// Compute the statistics of a set of values.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        Self {
            count: values.len(),
            mean: values.mean(),
            min: values.min(),
            max: values.max(),
            stddev: values.population_std_dev(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if `value` lies within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

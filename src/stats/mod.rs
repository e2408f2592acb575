//! Summary statistics over sample series.
//!
//! All estimators are the sample (Bessel-corrected) versions; a series with
//! fewer than two values has zero variance by convention.

pub mod student_t;

use serde::{Deserialize, Serialize};

/// Arithmetic mean. Zero for an empty slice.
///
/// Stays finite for any finite input, including values near `f64::MAX`
/// whose plain sum would overflow.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum = values.iter().sum::<f64>();
    if sum.is_finite() {
        return sum / n;
    }
    // Running update; every step is a convex combination of finite values
    values
        .iter()
        .enumerate()
        .fold(0.0, |m, (i, v)| m + (v / (i + 1) as f64 - m / (i + 1) as f64))
}

/// Median; the average of the two middle values when the length is even.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample variance, dividing by `n - 1`.
pub fn variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() - 1) as f64
}

/// Sample standard deviation (square root of [`variance`]).
///
/// Falls back to squaring deviations scaled by the largest one when the
/// variance itself is not representable.
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    let var = variance(values, mean);
    if var.is_finite() {
        return var.sqrt();
    }
    let scale = values
        .iter()
        .map(|v| (v / 2.0 - mean / 2.0).abs())
        .fold(0.0, f64::max);
    if scale == 0.0 {
        return 0.0;
    }
    let scaled = values
        .iter()
        .map(|v| {
            let d = (v / 2.0 - mean / 2.0) / scale;
            d * d
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;
    2.0 * scale * scaled.sqrt()
}

/// Finalized statistics for one metric.
///
/// Serialized field names follow the persisted result format:
/// `values`, `mean`, `median`, `stdev`, `variance`, `repetitions`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub values: Vec<f64>,
    pub mean: f64,
    pub median: f64,
    pub stdev: f64,
    pub variance: f64,
    pub repetitions: u32,
}

impl MetricSummary {
    pub fn from_values(values: Vec<f64>) -> Self {
        let mean = mean(&values);
        let variance = variance(&values, mean);
        Self {
            median: median(&values),
            stdev: std_dev(&values, mean),
            variance,
            mean,
            repetitions: values.len() as u32,
            values,
        }
    }

    pub fn min(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Coefficient of variation (`stdev / |mean|`), zero when the mean is zero.
    pub fn cv(&self) -> f64 {
        if self.mean != 0.0 {
            self.stdev / self.mean.abs()
        } else {
            0.0
        }
    }
}

//! Per-metric convergence predicate.
//!
//! A metric has converged when the full width of the two-sided Student's-t
//! confidence interval on its mean, relative to the mean, is below the
//! configured threshold.

use crate::stats::{self, student_t};
use serde::Serialize;

/// Outcome of one convergence check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Relative width is below the threshold (or every sample is exactly zero).
    Converged,
    /// Relative width is at or above the threshold.
    TooWide,
    /// Mean is exactly zero but the samples are not: relative width is undefined.
    Degenerate,
    /// Fewer than two samples; no standard error exists yet.
    Insufficient,
}

impl Verdict {
    pub fn is_converged(self) -> bool {
        self == Verdict::Converged
    }
}

/// Derived state of one series at one check. Recomputed from the samples every time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ConvergenceState {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Half-width of the confidence interval (`t * s / sqrt(n)`).
    pub half_width: f64,
    /// `2h / |mean|`; `None` when the mean is zero or the series is too short.
    pub relative_width: Option<f64>,
    pub verdict: Verdict,
}

/// Evaluate the convergence predicate on a sample series.
pub fn evaluate(values: &[f64], confidence_level: f64, threshold: f64) -> ConvergenceState {
    let count = values.len();
    let mean = stats::mean(values);

    if count < 2 {
        return ConvergenceState {
            count,
            mean,
            std_dev: 0.0,
            half_width: f64::INFINITY,
            relative_width: None,
            verdict: Verdict::Insufficient,
        };
    }

    let std_dev = stats::std_dev(values, mean);
    let std_err = std_dev / (count as f64).sqrt();
    let t = student_t::critical_value(confidence_level, (count - 1) as u32);
    let half_width = t * std_err;

    if mean == 0.0 {
        let verdict = if std_dev == 0.0 {
            Verdict::Converged
        } else {
            Verdict::Degenerate
        };
        return ConvergenceState {
            count,
            mean,
            std_dev,
            half_width,
            relative_width: None,
            verdict,
        };
    }

    let relative = (2.0 * half_width) / mean.abs();
    // NaN or infinity must never pass
    let verdict = if relative < threshold {
        Verdict::Converged
    } else {
        Verdict::TooWide
    };

    ConvergenceState {
        count,
        mean,
        std_dev,
        half_width,
        relative_width: Some(relative),
        verdict,
    }
}

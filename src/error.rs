//! Error types for sampling runs and metric collection.

use crate::metric::MetricName;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SamplerError>;

/// Failure of a single trial, reported by a [`MetricCollector`](crate::collector::MetricCollector).
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The workload process could not be started or waited on.
    #[error("failed to launch workload: {0}")]
    Spawn(#[from] std::io::Error),

    /// The workload ran but exited unsuccessfully.
    #[error("workload exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Output was captured but could not be turned into metric values.
    #[error("could not parse workload output: {0}")]
    Unparseable(String),

    /// The trial exceeded the collector's per-trial time budget.
    #[error("trial timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("{0}")]
    Other(String),
}

/// Terminal failure of a sampling run.
///
/// No partial [`SamplingResult`](crate::result::SamplingResult) accompanies any
/// of these: a failed run produces an error and nothing else.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// `min < 1` or `max < min`.
    #[error("invalid repetition bounds: min={min}, max={max}")]
    BoundsViolation { min: u32, max: u32 },

    #[error("confidence level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),

    #[error("relative width threshold must be in (0, 1), got {0}")]
    InvalidThreshold(f64),

    #[error("at least one metric must be tracked")]
    NoMetrics,

    /// The collector reported a failure; retries (if any) were exhausted.
    #[error("trial {trial} failed after {attempts} attempt(s): {source}")]
    Collector {
        trial: u32,
        attempts: u32,
        #[source]
        source: CollectorError,
    },

    /// A trial succeeded but did not report every tracked metric.
    #[error("trial {trial} is missing metrics: {}", join_names(.missing))]
    IncompleteTrial { trial: u32, missing: Vec<MetricName> },

    /// A trial reported NaN or an infinite value.
    #[error("trial {trial} reported a non-finite value for '{metric}': {value}")]
    NonFiniteValue {
        trial: u32,
        metric: MetricName,
        value: f64,
    },

    /// The run was cancelled before it could finish.
    #[error("run cancelled after {completed_trials} completed trial(s)")]
    Cancelled { completed_trials: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_names(names: &[MetricName]) -> String {
    names
        .iter()
        .map(MetricName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

//! The terminal artifact of a sampling run.

use crate::convergence::{ConvergenceState, Verdict};
use crate::metric::MetricName;
use crate::stats::MetricSummary;
use serde::Serialize;
use std::collections::BTreeMap;

/// How a successful run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalPhase {
    /// Every metric converged at or before the cap.
    Converged,
    /// The cap was reached with at least one metric not converged.
    CappedAtMax,
}

/// Finalized per-metric statistics of one completed run.
///
/// Serializes as one object keyed by metric name plus the
/// `reached_cap_without_convergence` flag:
///
/// ```json
/// { "time": { "values": [1.0, 1.0], "mean": 1.0, "median": 1.0,
///             "stdev": 0.0, "variance": 0.0, "repetitions": 2 },
///   "reached_cap_without_convergence": false }
/// ```
#[derive(Clone, Debug, Serialize)]
pub struct SamplingResult {
    #[serde(flatten)]
    metrics: BTreeMap<MetricName, MetricSummary>,
    reached_cap_without_convergence: bool,
    #[serde(skip)]
    trials: u32,
    #[serde(skip)]
    phase: FinalPhase,
    #[serde(skip)]
    convergence: BTreeMap<MetricName, ConvergenceState>,
}

impl SamplingResult {
    pub(crate) fn new(
        series: BTreeMap<MetricName, Vec<f64>>,
        convergence: BTreeMap<MetricName, ConvergenceState>,
        trials: u32,
    ) -> Self {
        let all_converged = convergence.values().all(|s| s.verdict.is_converged());
        let phase = if all_converged {
            FinalPhase::Converged
        } else {
            FinalPhase::CappedAtMax
        };
        let metrics = series
            .into_iter()
            .map(|(name, values)| (name, MetricSummary::from_values(values)))
            .collect();
        Self {
            metrics,
            reached_cap_without_convergence: !all_converged,
            trials,
            phase,
            convergence,
        }
    }

    pub fn metrics(&self) -> &BTreeMap<MetricName, MetricSummary> {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&MetricSummary> {
        self.metrics.get(name)
    }

    pub fn reached_cap_without_convergence(&self) -> bool {
        self.reached_cap_without_convergence
    }

    /// Number of trials the run consumed.
    pub fn trials(&self) -> u32 {
        self.trials
    }

    pub fn phase(&self) -> FinalPhase {
        self.phase
    }

    /// Convergence state of each metric at the final check.
    pub fn convergence(&self) -> &BTreeMap<MetricName, ConvergenceState> {
        &self.convergence
    }

    /// Metrics whose mean was exactly zero with non-zero spread at the final check.
    pub fn degenerate_metrics(&self) -> Vec<&MetricName> {
        self.convergence
            .iter()
            .filter(|(_, s)| s.verdict == Verdict::Degenerate)
            .map(|(name, _)| name)
            .collect()
    }
}

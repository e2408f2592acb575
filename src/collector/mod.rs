//! Metric collectors: one call runs one trial and reports a value per metric.
//!
//! The sampler only depends on the [`MetricCollector`] trait. Closures with
//! the right signature implement it directly; [`ProcessCollector`] runs a
//! local executable and scrapes metrics out of its output.

pub mod parse;
pub mod process;

pub use parse::parse_metrics;
pub use process::{ProcessCollector, ProcessCollectorConfig, WALL_TIME_METRIC};

use crate::error::CollectorError;
use crate::metric::{ParameterSet, TrialResult, WorkloadId};

/// Runs one independent trial of a workload under a fixed parameter set.
///
/// Repeated calls with the same inputs must be independent trials: no state
/// carried from one call may bias the next.
pub trait MetricCollector {
    fn collect(
        &mut self,
        workload: &WorkloadId,
        params: &ParameterSet,
    ) -> Result<TrialResult, CollectorError>;
}

impl<F> MetricCollector for F
where
    F: FnMut(&WorkloadId, &ParameterSet) -> Result<TrialResult, CollectorError>,
{
    fn collect(
        &mut self,
        workload: &WorkloadId,
        params: &ParameterSet,
    ) -> Result<TrialResult, CollectorError> {
        self(workload, params)
    }
}

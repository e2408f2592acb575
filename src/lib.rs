//! # Adaptive-Bench
//!
//! Runs a noisy measurement repeatedly and decides at runtime how many
//! repetitions are enough: after a minimum number of trials, every tracked
//! metric's Student's-t confidence interval is checked, and sampling stops
//! once all of them are narrower than a relative threshold, or when the
//! repetition cap is reached.

pub mod affinity;
pub mod collector;
pub mod config;
pub mod convergence;
pub mod error;
pub mod metric;
pub mod report;
pub mod result;
pub mod sampler;
pub mod stats;
pub mod suite;

pub use config::{PinStrategy, SamplerConfig};
pub use error::{CollectorError, Result, SamplerError};
pub use metric::{MetricName, ParameterSet, RepetitionBounds, TrialResult, WorkloadId};
pub use result::{FinalPhase, SamplingResult};
pub use sampler::{run_adaptive, AdaptiveSampler, CancelToken};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::collector::{MetricCollector, ProcessCollector, ProcessCollectorConfig};
    pub use crate::suite::{ExecutionOrder, Suite, SuiteReport};
    pub use crate::{
        AdaptiveSampler, CollectorError, MetricName, ParameterSet, RepetitionBounds,
        SamplerConfig, SamplerError, SamplingResult, WorkloadId,
    };
}

//! Adaptive repetition: run trials until every metric's confidence interval
//! is tight enough, or until the repetition cap.
//!
//! A run moves through `Collecting` (fewer trials than the first evaluation
//! point) and `Evaluating`, and ends either converged or capped at the
//! maximum. Any collector failure, incomplete trial or cancellation ends the
//! run with an error and no result.

use crate::affinity;
use crate::collector::MetricCollector;
use crate::config::SamplerConfig;
use crate::convergence::{self, ConvergenceState};
use crate::error::{Result, SamplerError};
use crate::metric::{MetricName, ParameterSet, RepetitionBounds, TrialResult, WorkloadId};
use crate::result::SamplingResult;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked before every trial attempt and
/// again when an attempt returns.
///
/// Cancelling never truncates a run into a result: the run ends with
/// [`SamplerError::Cancelled`], and a trial in flight when the flag is set
/// is dropped.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone of the token observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Where a run in progress stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Collecting,
    Evaluating,
}

/// Per-run sample storage. Lives only for the duration of one run.
struct Run {
    series: BTreeMap<MetricName, Vec<f64>>,
    trials: u32,
    first_evaluation: u32,
}

impl Run {
    fn new(metrics: &[MetricName], bounds: &RepetitionBounds) -> Self {
        let capacity = bounds.max() as usize;
        Self {
            series: metrics
                .iter()
                .map(|name| (name.clone(), Vec::with_capacity(capacity)))
                .collect(),
            trials: 0,
            first_evaluation: bounds.first_evaluation(),
        }
    }

    fn phase(&self) -> Phase {
        if self.trials < self.first_evaluation {
            Phase::Collecting
        } else {
            Phase::Evaluating
        }
    }

    /// Append one trial. Either every tracked metric gets a value or none does.
    fn record(&mut self, mut trial: TrialResult) -> Result<()> {
        let number = self.trials + 1;

        let missing: Vec<MetricName> = self
            .series
            .keys()
            .filter(|name| !trial.contains_key(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SamplerError::IncompleteTrial {
                trial: number,
                missing,
            });
        }

        for name in self.series.keys() {
            let value = trial[name];
            if !value.is_finite() {
                return Err(SamplerError::NonFiniteValue {
                    trial: number,
                    metric: name.clone(),
                    value,
                });
            }
        }

        for (name, values) in self.series.iter_mut() {
            if let Some(value) = trial.remove(name) {
                values.push(value);
            }
        }
        self.trials = number;
        Ok(())
    }

    fn check(&self, config: &SamplerConfig) -> BTreeMap<MetricName, ConvergenceState> {
        self.series
            .iter()
            .map(|(name, values)| {
                let state = convergence::evaluate(
                    values,
                    config.confidence_level,
                    config.relative_width_threshold,
                );
                (name.clone(), state)
            })
            .collect()
    }
}

/// Decides how many trials to run and summarizes them.
///
/// Holds only its configuration; runs share nothing and the sampler may be
/// used from several threads at once.
#[derive(Clone, Debug)]
pub struct AdaptiveSampler {
    config: SamplerConfig,
}

impl AdaptiveSampler {
    pub fn new(config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Run trials of `workload` under `params` until all `metrics` converge or the cap is hit.
    pub fn run_adaptive<C>(
        &self,
        collector: &mut C,
        workload: &WorkloadId,
        params: &ParameterSet,
        metrics: &[MetricName],
    ) -> Result<SamplingResult>
    where
        C: MetricCollector + ?Sized,
    {
        self.run_adaptive_with_cancel(collector, workload, params, metrics, &CancelToken::new())
    }

    /// Same as [`run_adaptive`](Self::run_adaptive), aborting when `cancel` is set.
    pub fn run_adaptive_with_cancel<C>(
        &self,
        collector: &mut C,
        workload: &WorkloadId,
        params: &ParameterSet,
        metrics: &[MetricName],
        cancel: &CancelToken,
    ) -> Result<SamplingResult>
    where
        C: MetricCollector + ?Sized,
    {
        let metrics = dedup_metrics(metrics)?;
        let bounds = self.config.bounds;

        tracing::info!(
            "Sampling {} [{}]: {} metric(s), {}..={} trials, {:.0}% CI, width < {:.1}%",
            workload,
            params.label(),
            metrics.len(),
            bounds.min(),
            bounds.max(),
            self.config.confidence_level * 100.0,
            self.config.relative_width_threshold * 100.0
        );

        self.sample(collector, workload, params, &metrics, cancel)
            .inspect_err(|e| tracing::error!("Sampling {} aborted: {}", workload, e))
    }

    fn sample<C>(
        &self,
        collector: &mut C,
        workload: &WorkloadId,
        params: &ParameterSet,
        metrics: &[MetricName],
        cancel: &CancelToken,
    ) -> Result<SamplingResult>
    where
        C: MetricCollector + ?Sized,
    {
        let bounds = self.config.bounds;
        let mut run = Run::new(metrics, &bounds);
        let _run_pin = affinity::run_guard(self.config.pin_strategy);

        loop {
            let trial = self.collect_trial(collector, workload, params, run.trials, cancel)?;
            run.record(trial)?;
            tracing::debug!("{}: trial {} recorded", workload, run.trials);

            if run.phase() == Phase::Collecting {
                continue;
            }

            let states = run.check(&self.config);
            for (name, state) in &states {
                tracing::debug!(
                    "{}: {} after {} trials: mean={:.6} sd={:.6} rel_width={:?} -> {:?}",
                    workload,
                    name,
                    state.count,
                    state.mean,
                    state.std_dev,
                    state.relative_width,
                    state.verdict
                );
            }

            if states.values().all(|s| s.verdict.is_converged()) {
                tracing::info!("{}: converged after {} trials", workload, run.trials);
                return Ok(SamplingResult::new(run.series, states, run.trials));
            }

            if run.trials >= bounds.max() {
                let pending: Vec<&str> = states
                    .iter()
                    .filter(|(_, s)| !s.verdict.is_converged())
                    .map(|(n, _)| n.as_str())
                    .collect();
                tracing::warn!(
                    "{}: reached cap of {} trials without convergence ({})",
                    workload,
                    bounds.max(),
                    pending.join(", ")
                );
                return Ok(SamplingResult::new(run.series, states, run.trials));
            }
        }
    }

    /// One trial, with up to `max_trial_retries` extra attempts on collector failure.
    fn collect_trial<C>(
        &self,
        collector: &mut C,
        workload: &WorkloadId,
        params: &ParameterSet,
        completed: u32,
        cancel: &CancelToken,
    ) -> Result<TrialResult>
    where
        C: MetricCollector + ?Sized,
    {
        let trial = completed + 1;
        let allowed = self.config.max_trial_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(SamplerError::Cancelled {
                    completed_trials: completed,
                });
            }
            attempt += 1;

            let outcome = {
                let _trial_pin = affinity::trial_guard(self.config.pin_strategy);
                collector.collect(workload, params)
            };
            // A trial that finishes after cancellation is discarded, never recorded
            if cancel.is_cancelled() {
                return Err(SamplerError::Cancelled {
                    completed_trials: completed,
                });
            }

            match outcome {
                Ok(result) => return Ok(result),
                Err(e) if attempt < allowed => {
                    tracing::warn!(
                        "{}: trial {} attempt {}/{} failed, retrying: {}",
                        workload,
                        trial,
                        attempt,
                        allowed,
                        e
                    );
                }
                Err(source) => {
                    return Err(SamplerError::Collector {
                        trial,
                        attempts: attempt,
                        source,
                    })
                }
            }
        }
    }
}

/// One-shot form taking every knob explicitly.
pub fn run_adaptive<C>(
    collector: &mut C,
    workload: &WorkloadId,
    params: &ParameterSet,
    metrics: &[MetricName],
    bounds: RepetitionBounds,
    confidence_level: f64,
    relative_width_threshold: f64,
) -> Result<SamplingResult>
where
    C: MetricCollector + ?Sized,
{
    let config = SamplerConfig {
        bounds,
        confidence_level,
        relative_width_threshold,
        ..SamplerConfig::default()
    };
    AdaptiveSampler::new(config)?.run_adaptive(collector, workload, params, metrics)
}

fn dedup_metrics(metrics: &[MetricName]) -> Result<Vec<MetricName>> {
    let mut unique = metrics.to_vec();
    unique.sort();
    unique.dedup();
    if unique.is_empty() {
        return Err(SamplerError::NoMetrics);
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use crate::result::FinalPhase;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Collector driven by a function of the (1-based) call number.
    struct Scripted<F> {
        calls: u32,
        script: F,
    }

    impl<F> Scripted<F>
    where
        F: FnMut(u32) -> std::result::Result<TrialResult, CollectorError>,
    {
        fn new(script: F) -> Self {
            Self { calls: 0, script }
        }
    }

    impl<F> MetricCollector for Scripted<F>
    where
        F: FnMut(u32) -> std::result::Result<TrialResult, CollectorError>,
    {
        fn collect(
            &mut self,
            _workload: &WorkloadId,
            _params: &ParameterSet,
        ) -> std::result::Result<TrialResult, CollectorError> {
            self.calls += 1;
            (self.script)(self.calls)
        }
    }

    fn trial(pairs: &[(&str, f64)]) -> TrialResult {
        pairs.iter().map(|(n, v)| (MetricName::from(*n), *v)).collect()
    }

    fn names(list: &[&str]) -> Vec<MetricName> {
        list.iter().map(|n| MetricName::from(*n)).collect()
    }

    fn sampler(min: u32, max: u32) -> AdaptiveSampler {
        AdaptiveSampler::new(SamplerConfig::default().with_bounds(min, max).unwrap()).unwrap()
    }

    fn workload() -> WorkloadId {
        WorkloadId::from("workload")
    }

    #[test]
    fn test_constant_time_stops_at_minimum() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", 1.000)])));
        let result = sampler(2, 20)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap();

        assert_eq!(collector.calls, 2);
        assert_eq!(result.trials(), 2);
        let time = result.metric("time").unwrap();
        assert_eq!(time.mean, 1.0);
        assert_eq!(time.stdev, 0.0);
        assert_eq!(time.repetitions, 2);
        assert!(!result.reached_cap_without_convergence());
        assert_eq!(result.phase(), FinalPhase::Converged);
    }

    #[test]
    fn test_all_zero_metric_converges_at_minimum() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("errors", 0.0)])));
        let result = sampler(4, 20)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["errors"]))
            .unwrap();
        assert_eq!(result.trials(), 4);
        assert!(!result.reached_cap_without_convergence());
    }

    #[test]
    fn test_slowest_metric_drives_run_to_cap() {
        // "fast" is constant and converges as soon as it is evaluated (trial 3);
        // "noisy" alternates wildly and never does.
        let mut collector = Scripted::new(|n| {
            let noisy = if n % 2 == 0 { 1.0 } else { 100.0 };
            Ok(trial(&[("fast", 10.0), ("noisy", noisy)]))
        });
        let result = sampler(3, 10)
            .run_adaptive(
                &mut collector,
                &workload(),
                &ParameterSet::default(),
                &names(&["fast", "noisy"]),
            )
            .unwrap();

        assert_eq!(collector.calls, 10);
        assert_eq!(result.trials(), 10);
        assert!(result.reached_cap_without_convergence());
        assert_eq!(result.phase(), FinalPhase::CappedAtMax);
        assert!(result.convergence()["fast"].verdict.is_converged());
        assert!(!result.convergence()["noisy"].verdict.is_converged());
        assert_eq!(result.metric("fast").unwrap().repetitions, 10);
    }

    #[test]
    fn test_collector_failure_aborts_without_result() {
        let mut collector = Scripted::new(|n| {
            if n == 4 {
                Err(CollectorError::NonZeroExit {
                    code: Some(1),
                    stderr: "segfault".into(),
                })
            } else {
                Ok(trial(&[("time", n as f64)]))
            }
        });
        let err = sampler(5, 10)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap_err();

        assert_eq!(collector.calls, 4);
        assert!(matches!(
            err,
            SamplerError::Collector { trial: 4, attempts: 1, .. }
        ));
    }

    #[test]
    fn test_missing_metric_is_incomplete_trial() {
        let mut collector = Scripted::new(|n| {
            if n == 2 {
                Ok(trial(&[("time", 1.0)]))
            } else {
                Ok(trial(&[("time", 1.0), ("rss", 10.0)]))
            }
        });
        let err = sampler(3, 10)
            .run_adaptive(
                &mut collector,
                &workload(),
                &ParameterSet::default(),
                &names(&["time", "rss"]),
            )
            .unwrap_err();

        match err {
            SamplerError::IncompleteTrial { trial, missing } => {
                assert_eq!(trial, 2);
                assert_eq!(missing, names(&["rss"]));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_non_finite_value_is_rejected() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", f64::NAN)])));
        let err = sampler(2, 5)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap_err();
        assert!(matches!(err, SamplerError::NonFiniteValue { trial: 1, .. }));
    }

    #[test]
    fn test_minimum_of_one_still_samples_twice() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", 3.0)])));
        let result = sampler(1, 10)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap();
        assert_eq!(result.trials(), 2);
        assert!(!result.reached_cap_without_convergence());
    }

    #[test]
    fn test_single_trial_cap_is_flagged() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", 3.0)])));
        let result = sampler(1, 1)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap();
        assert_eq!(result.trials(), 1);
        assert!(result.reached_cap_without_convergence());
    }

    #[test]
    fn test_degenerate_metric_runs_to_cap() {
        let mut collector = Scripted::new(|n| {
            let delta = if n % 2 == 0 { 1.0 } else { -1.0 };
            Ok(trial(&[("delta", delta)]))
        });
        let result = sampler(2, 6)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["delta"]))
            .unwrap();
        assert_eq!(result.trials(), 6);
        assert!(result.reached_cap_without_convergence());
        assert_eq!(result.degenerate_metrics().len(), 1);
    }

    #[test]
    fn test_extra_metrics_are_ignored() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", 2.0), ("noise", 7.0)])));
        let result = sampler(2, 5)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap();
        assert_eq!(result.metrics().len(), 1);
        assert!(result.metric("noise").is_none());
    }

    #[test]
    fn test_duplicate_metric_names_tracked_once() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", 2.0)])));
        let result = sampler(2, 5)
            .run_adaptive(
                &mut collector,
                &workload(),
                &ParameterSet::default(),
                &names(&["time", "time"]),
            )
            .unwrap();
        assert_eq!(result.metrics().len(), 1);
    }

    #[test]
    fn test_retry_recovers_failed_trial() {
        let mut collector = Scripted::new(|n| {
            if n == 2 {
                Err(CollectorError::Unparseable("garbled".into()))
            } else {
                Ok(trial(&[("time", 1.0)]))
            }
        });
        let config = SamplerConfig::default()
            .with_bounds(3, 10)
            .unwrap()
            .with_retries(1);
        let result = AdaptiveSampler::new(config)
            .unwrap()
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap();

        // The failed attempt is discarded: 3 recorded trials, 4 collector calls
        assert_eq!(result.trials(), 3);
        assert_eq!(collector.calls, 4);
        assert_eq!(result.metric("time").unwrap().values.len(), 3);
    }

    #[test]
    fn test_retries_exhausted() {
        let mut collector = Scripted::new(|n| {
            if n >= 2 {
                Err(CollectorError::TimedOut(std::time::Duration::from_secs(1)))
            } else {
                Ok(trial(&[("time", 1.0)]))
            }
        });
        let config = SamplerConfig::default()
            .with_bounds(3, 10)
            .unwrap()
            .with_retries(2);
        let err = AdaptiveSampler::new(config)
            .unwrap()
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
            .unwrap_err();

        assert_eq!(collector.calls, 4);
        assert!(matches!(
            err,
            SamplerError::Collector { trial: 2, attempts: 3, .. }
        ));
    }

    #[test]
    fn test_cancellation_yields_error() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut collector = Scripted::new(move |n| {
            if n == 3 {
                trigger.cancel();
            }
            Ok(trial(&[("time", n as f64)]))
        });
        let err = sampler(5, 10)
            .run_adaptive_with_cancel(
                &mut collector,
                &workload(),
                &ParameterSet::default(),
                &names(&["time"]),
                &cancel,
            )
            .unwrap_err();

        assert_eq!(collector.calls, 3);
        assert!(matches!(err, SamplerError::Cancelled { completed_trials: 2 }));
    }

    #[test]
    fn test_cancel_during_converging_trial_discards_it() {
        // Trial 2 would converge the constant series; cancelling while it runs
        // must still end the run with an error.
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut collector = Scripted::new(move |n| {
            if n == 2 {
                trigger.cancel();
            }
            Ok(trial(&[("time", 1.0)]))
        });
        let err = sampler(2, 10)
            .run_adaptive_with_cancel(
                &mut collector,
                &workload(),
                &ParameterSet::default(),
                &names(&["time"]),
                &cancel,
            )
            .unwrap_err();

        assert_eq!(collector.calls, 2);
        assert!(matches!(err, SamplerError::Cancelled { completed_trials: 1 }));
    }

    #[test]
    fn test_cancel_during_failed_attempt_is_not_retried() {
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let mut collector = Scripted::new(move |_| {
            trigger.cancel();
            Err(CollectorError::Other("flaky".into()))
        });
        let sampler = AdaptiveSampler::new(
            SamplerConfig::default()
                .with_bounds(2, 5)
                .unwrap()
                .with_retries(3),
        )
        .unwrap();
        let err = sampler
            .run_adaptive_with_cancel(
                &mut collector,
                &workload(),
                &ParameterSet::default(),
                &names(&["time"]),
                &cancel,
            )
            .unwrap_err();

        assert_eq!(collector.calls, 1);
        assert!(matches!(err, SamplerError::Cancelled { completed_trials: 0 }));
    }

    #[test]
    fn test_invalid_inputs_rejected_before_any_trial() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", 1.0)])));

        let err = sampler(2, 5)
            .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &[])
            .unwrap_err();
        assert!(matches!(err, SamplerError::NoMetrics));

        let err = run_adaptive(
            &mut collector,
            &workload(),
            &ParameterSet::default(),
            &names(&["time"]),
            RepetitionBounds::new(2, 5).unwrap(),
            1.2,
            0.05,
        )
        .unwrap_err();
        assert!(matches!(err, SamplerError::InvalidConfidenceLevel(_)));

        assert_eq!(collector.calls, 0);
    }

    #[test]
    fn test_free_function_runs() {
        let mut collector = Scripted::new(|_| Ok(trial(&[("time", 1.0)])));
        let result = run_adaptive(
            &mut collector,
            &workload(),
            &ParameterSet::default(),
            &names(&["time"]),
            RepetitionBounds::new(2, 20).unwrap(),
            0.95,
            0.05,
        )
        .unwrap();
        assert_eq!(result.trials(), 2);
    }

    #[test]
    fn test_sampler_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AdaptiveSampler>();
        assert_send_sync::<CancelToken>();
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_cap(
            seed in any::<u64>(),
            min in 1u32..6,
            extra in 0u32..25,
            spread in 0.0f64..50.0,
        ) {
            let max = min + extra;
            let mut rng = StdRng::seed_from_u64(seed);
            let mut collector = Scripted::new(move |_| {
                let value = 100.0 + rng.random_range(-1.0..=1.0) * spread;
                Ok(trial(&[("time", value)]))
            });
            let result = sampler(min, max)
                .run_adaptive(&mut collector, &workload(), &ParameterSet::default(), &names(&["time"]))
                .unwrap();

            prop_assert!(result.trials() <= max);
            prop_assert_eq!(collector.calls, result.trials());
            let converged = result.convergence()["time"].verdict.is_converged();
            prop_assert_eq!(result.reached_cap_without_convergence(), !converged);
            if result.reached_cap_without_convergence() {
                prop_assert_eq!(result.trials(), max);
            } else {
                prop_assert!(result.trials() >= min.max(2));
            }
        }
    }
}

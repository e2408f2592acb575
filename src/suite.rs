//! Run one adaptive sampling per (workload, parameter set) configuration.
//!
//! Sequential runs may execute configurations in a seeded random order to
//! avoid systematic ordering bias (caches warmed by the previous
//! configuration, thermal drift); results are always reported in declaration
//! order. Parallel runs give every configuration its own collector.

use crate::collector::MetricCollector;
use crate::error::SamplerError;
use crate::metric::{MetricName, ParameterSet, WorkloadId};
use crate::result::SamplingResult;
use crate::sampler::AdaptiveSampler;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;

/// One configuration to measure.
#[derive(Clone, Debug, Serialize)]
pub struct SuiteEntry {
    pub workload: WorkloadId,
    pub params: ParameterSet,
}

/// Order in which a sequential suite executes its configurations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionOrder {
    /// As added
    Declared,
    /// Random permutation from a fresh seed (logged, so the order can be replayed)
    #[default]
    Shuffled,
    /// Random permutation from a fixed seed
    ShuffledWithSeed(u64),
}

/// Result of one configuration. A failed configuration does not hide the others.
#[derive(Debug)]
pub struct SuiteOutcome {
    pub entry: SuiteEntry,
    pub outcome: Result<SamplingResult, SamplerError>,
}

/// Outcomes of every configuration, in declaration order.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub outcomes: Vec<SuiteOutcome>,
}

impl SuiteReport {
    pub fn successes(&self) -> impl Iterator<Item = (&SuiteEntry, &SamplingResult)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.outcome.as_ref().ok().map(|r| (&o.entry, r)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SuiteEntry, &SamplerError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.outcome.as_ref().err().map(|e| (&o.entry, e)))
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.is_ok())
    }
}

/// A list of configurations sharing one sampler and one metric list.
pub struct Suite {
    sampler: AdaptiveSampler,
    metrics: Vec<MetricName>,
    entries: Vec<SuiteEntry>,
}

impl Suite {
    pub fn new(sampler: AdaptiveSampler, metrics: Vec<MetricName>) -> Self {
        Self {
            sampler,
            metrics,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, workload: WorkloadId, params: ParameterSet) -> &mut Self {
        self.entries.push(SuiteEntry { workload, params });
        self
    }

    /// Add one configuration per raw argument list (see [`ParameterSet::from_args`]).
    pub fn add_arg_sets<I, A, S>(&mut self, workload: &WorkloadId, arg_sets: I) -> &mut Self
    where
        I: IntoIterator<Item = A>,
        A: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for args in arg_sets {
            self.add(workload.clone(), ParameterSet::from_args(args));
        }
        self
    }

    pub fn entries(&self) -> &[SuiteEntry] {
        &self.entries
    }

    /// Run every configuration on the calling thread, one after another.
    pub fn run_sequential<C>(&self, collector: &mut C, order: ExecutionOrder) -> SuiteReport
    where
        C: MetricCollector + ?Sized,
    {
        let schedule = self.schedule(order);
        let mut outcomes: Vec<Option<Result<SamplingResult, SamplerError>>> =
            (0..self.entries.len()).map(|_| None).collect();

        for idx in schedule {
            let entry = &self.entries[idx];
            outcomes[idx] = Some(self.sampler.run_adaptive(
                collector,
                &entry.workload,
                &entry.params,
                &self.metrics,
            ));
        }

        self.assemble(outcomes)
    }

    /// Run configurations concurrently; `factory` builds one collector per configuration.
    ///
    /// Only use this when trials of different configurations do not disturb
    /// each other's measurements (e.g. the collector submits to separate machines).
    pub fn run_parallel<F, C>(&self, factory: F) -> SuiteReport
    where
        F: Fn(&SuiteEntry) -> C + Sync,
        C: MetricCollector,
    {
        let outcomes: Vec<Option<Result<SamplingResult, SamplerError>>> = self
            .entries
            .par_iter()
            .map(|entry| {
                let mut collector = factory(entry);
                Some(self.sampler.run_adaptive(
                    &mut collector,
                    &entry.workload,
                    &entry.params,
                    &self.metrics,
                ))
            })
            .collect();

        self.assemble(outcomes)
    }

    fn schedule(&self, order: ExecutionOrder) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.entries.len()).collect();
        let seed = match order {
            ExecutionOrder::Declared => return indices,
            ExecutionOrder::Shuffled => rand::random::<u64>(),
            ExecutionOrder::ShuffledWithSeed(seed) => seed,
        };
        tracing::info!("Shuffling {} configurations with seed {}", indices.len(), seed);
        indices.shuffle(&mut StdRng::seed_from_u64(seed));
        indices
    }

    fn assemble(
        &self,
        outcomes: Vec<Option<Result<SamplingResult, SamplerError>>>,
    ) -> SuiteReport {
        let outcomes = self
            .entries
            .iter()
            .cloned()
            .zip(outcomes)
            .filter_map(|(entry, outcome)| outcome.map(|outcome| SuiteOutcome { entry, outcome }))
            .collect();
        SuiteReport { outcomes }
    }
}

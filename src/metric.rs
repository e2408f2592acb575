//! Core data model: metric names, trial results, bounds and parameter sets.

use crate::error::{Result, SamplerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque name of a measurable quantity (e.g. `"wall_time_s"`, `"peak_rss_kb"`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricName(String);

impl MetricName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MetricName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for MetricName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Values produced by one trial, keyed by metric.
pub type TrialResult = BTreeMap<MetricName, f64>;

/// Identity of the workload being measured.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadId(String);

impl WorkloadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkloadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Minimum and maximum number of trials for one run.
///
/// Always satisfies `min >= 1 && max >= min`; construct through [`RepetitionBounds::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBounds", into = "RawBounds")]
pub struct RepetitionBounds {
    min: u32,
    max: u32,
}

impl RepetitionBounds {
    pub fn new(min: u32, max: u32) -> Result<Self> {
        if min < 1 || max < min {
            return Err(SamplerError::BoundsViolation { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Trial count at which convergence may first be evaluated.
    ///
    /// A single sample has no standard error, so this is never below 2
    /// (but never above `max` either).
    pub fn first_evaluation(&self) -> u32 {
        self.min.max(2).min(self.max)
    }
}

impl Default for RepetitionBounds {
    fn default() -> Self {
        Self { min: 5, max: 30 }
    }
}

#[derive(Serialize, Deserialize)]
struct RawBounds {
    min: u32,
    max: u32,
}

impl TryFrom<RawBounds> for RepetitionBounds {
    type Error = SamplerError;

    fn try_from(raw: RawBounds) -> Result<Self> {
        Self::new(raw.min, raw.max)
    }
}

impl From<RepetitionBounds> for RawBounds {
    fn from(b: RepetitionBounds) -> Self {
        Self {
            min: b.min,
            max: b.max,
        }
    }
}

/// Prefix marking an argument as a compile-time definition rather than a runtime argument.
pub const COMPILE_PREFIX: &str = "COMPILE:";

/// One configuration of a workload: runtime arguments plus compile-time definitions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub args: Vec<String>,
    pub compile_definitions: BTreeMap<String, String>,
}

impl ParameterSet {
    /// Split a raw argument list into runtime args and `COMPILE:KEY=VALUE` definitions.
    ///
    /// A `COMPILE:` entry without `=` is ignored.
    pub fn from_args<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for arg in raw {
            let arg = arg.as_ref();
            match arg.strip_prefix(COMPILE_PREFIX) {
                Some(def) => {
                    if let Some((key, value)) = def.split_once('=') {
                        set.compile_definitions
                            .insert(key.to_string(), value.to_string());
                    }
                }
                None => set.args.push(arg.to_string()),
            }
        }
        set
    }

    /// Stable, human-readable label (used in tables and CSV rows).
    pub fn label(&self) -> String {
        let defs = self
            .compile_definitions
            .iter()
            .map(|(k, v)| format!("-D{}={}", k, v));
        let parts: Vec<String> = defs.chain(self.args.iter().cloned()).collect();
        if parts.is_empty() {
            "(no args)".to_string()
        } else {
            parts.join(" ")
        }
    }
}

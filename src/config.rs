//! Sampler configuration.
//!
//! Everything that influences a run is passed in explicitly through
//! [`SamplerConfig`]; there is no process-wide state.

use crate::error::{Result, SamplerError};
use crate::metric::RepetitionBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// CPU pinning strategy while trials run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinStrategy {
    /// Leave scheduling to the OS
    #[default]
    None,
    /// Pin once for the whole run
    Global,
    /// Pin/unpin around every trial
    PerTrial,
}

/// Configuration for an adaptive sampling run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Minimum and maximum number of trials (default: 5..=30)
    pub bounds: RepetitionBounds,
    /// Two-sided confidence level of the interval (default: 0.95)
    pub confidence_level: f64,
    /// Stop once `CI width / mean` falls below this (default: 0.05)
    pub relative_width_threshold: f64,
    /// Extra attempts for a trial whose collector call failed (default: 0, abort immediately)
    pub max_trial_retries: u32,
    /// CPU pinning strategy (default: None)
    pub pin_strategy: PinStrategy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            bounds: RepetitionBounds::default(),
            confidence_level: 0.95,
            relative_width_threshold: 0.05,
            max_trial_retries: 0,
            pin_strategy: PinStrategy::default(),
        }
    }
}

impl SamplerConfig {
    pub fn with_bounds(mut self, min: u32, max: u32) -> Result<Self> {
        self.bounds = RepetitionBounds::new(min, max)?;
        Ok(self)
    }

    pub fn with_confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.relative_width_threshold = threshold;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_trial_retries = retries;
        self
    }

    pub fn with_pin_strategy(mut self, strategy: PinStrategy) -> Self {
        self.pin_strategy = strategy;
        self
    }

    /// Check the numeric ranges. Bounds are validated on construction.
    pub fn validate(&self) -> Result<()> {
        let level = self.confidence_level;
        if !(level > 0.0 && level < 1.0) {
            return Err(SamplerError::InvalidConfidenceLevel(level));
        }
        let threshold = self.relative_width_threshold;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(SamplerError::InvalidThreshold(threshold));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

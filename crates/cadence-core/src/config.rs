//! Configuration loading and typed config structures for the scheduler.
//!
//! The canonical configuration lives in `cadence-config.yaml` at the project
//! root. Every field has a default, so an empty document is a valid
//! configuration. Call [`SchedulerConfig::validate`] after loading to surface
//! rate and cap problems before anything starts ticking.

use std::path::Path;

use serde::Deserialize;

use crate::pacemaker::Budget;
use crate::rate::{self, FixedRate, RateError};

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A rate setting is unusable.
    #[error("invalid rate configuration: {source}")]
    Rate {
        /// The underlying rate error.
        #[from]
        source: RateError,
    },

    /// A non-rate field is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level scheduler configuration.
///
/// Mirrors the structure of `cadence-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed tick rate and per-frame budget.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Decoupled sub-simulation (physics) settings.
    #[serde(default)]
    pub sub_simulation: SubSimulationConfig,

    /// Headless demo driver settings.
    #[serde(default)]
    pub harness: HarnessConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SchedulerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Check every setting that can be checked before the loop starts.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Rate`] if the fixed delta is not `1/n` for a
    /// whole `n`, the sub-step cap is 0, or the default sub-simulation rate
    /// does not fit under the cap. Returns [`ConfigError::Invalid`] for a 0
    /// Hz default rate or unusable harness frame timings.
    pub fn validate(&self) -> Result<FixedRate, ConfigError> {
        let fixed = self.timing.fixed_rate()?;
        let sub = &self.sub_simulation;
        if sub.default_rate_hz == 0 {
            return Err(ConfigError::Invalid {
                field: "sub_simulation.default_rate_hz",
                reason: "must be at least 1 Hz".to_owned(),
            });
        }
        if sub.max_sub_steps == 0 {
            return Err(RateError::InvalidMaxSubSteps {
                requested: sub.max_sub_steps,
            }
            .into());
        }
        rate::check_cap(sub.default_rate_hz, fixed, sub.max_sub_steps)?;
        self.harness.validate()?;
        Ok(fixed)
    }
}

/// Fixed tick rate and per-frame budget.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimingConfig {
    /// Seconds per fixed tick; must be exactly `1/n` for a whole `n`.
    #[serde(default = "default_fixed_delta_seconds")]
    pub fixed_delta_seconds: f64,

    /// Cooperative time budget per frame, in milliseconds.
    #[serde(default = "default_budget_ms")]
    pub budget_ms: u64,

    /// Resumed slices a single tick may take before the fuse trips.
    #[serde(default = "default_max_slices_per_tick")]
    pub max_slices_per_tick: u32,

    /// Most ticks run in one frame; extra backlog is dropped (0 = no cap).
    #[serde(default)]
    pub max_ticks_per_frame: u32,
}

impl TimingConfig {
    /// The validated fixed tick rate.
    ///
    /// # Errors
    ///
    /// Returns [`RateError`] if the delta does not round-trip through a
    /// whole number of Hz.
    pub fn fixed_rate(&self) -> Result<FixedRate, RateError> {
        FixedRate::from_delta(self.fixed_delta_seconds)
    }

    /// The cooperative budget (coerced to at least 1 ms and 1 slice).
    pub fn budget(&self) -> Budget {
        Budget::new(self.budget_ms, self.max_slices_per_tick)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fixed_delta_seconds: default_fixed_delta_seconds(),
            budget_ms: default_budget_ms(),
            max_slices_per_tick: default_max_slices_per_tick(),
            max_ticks_per_frame: 0,
        }
    }
}

/// Decoupled sub-simulation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubSimulationConfig {
    /// Rate used when the sub-simulation is enabled without an explicit rate.
    #[serde(default = "default_sub_rate_hz")]
    pub default_rate_hz: u32,

    /// Maximum sub-steps inside a single fixed tick.
    #[serde(default = "default_max_sub_steps")]
    pub max_sub_steps: u32,

    /// Whether the sub-simulation is enabled at startup.
    #[serde(default = "default_true")]
    pub start_enabled: bool,
}

impl Default for SubSimulationConfig {
    fn default() -> Self {
        Self {
            default_rate_hz: default_sub_rate_hz(),
            max_sub_steps: default_max_sub_steps(),
            start_enabled: true,
        }
    }
}

/// Headless demo driver settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HarnessConfig {
    /// Number of frames to simulate.
    #[serde(default = "default_frames")]
    pub frames: u64,

    /// Seed for the frame-time jitter generator.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Mean wall-clock frame time, in milliseconds.
    #[serde(default = "default_mean_frame_ms")]
    pub mean_frame_ms: f64,

    /// Maximum jitter added to or removed from each frame, in milliseconds.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: f64,

    /// Bodies in the toy physics world.
    #[serde(default = "default_bodies")]
    pub bodies: u32,

    /// Agents swept by the toy ability phase.
    #[serde(default = "default_agents")]
    pub agents: u32,
}

impl HarnessConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.mean_frame_ms.is_finite() || self.mean_frame_ms <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "harness.mean_frame_ms",
                reason: format!("must be a positive number, got {}", self.mean_frame_ms),
            });
        }
        if !self.jitter_ms.is_finite() || self.jitter_ms < 0.0 {
            return Err(ConfigError::Invalid {
                field: "harness.jitter_ms",
                reason: format!("must be zero or positive, got {}", self.jitter_ms),
            });
        }
        Ok(())
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            seed: default_seed(),
            mean_frame_ms: default_mean_frame_ms(),
            jitter_ms: default_jitter_ms(),
            bodies: default_bodies(),
            agents: default_agents(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_fixed_delta_seconds() -> f64 {
    60.0_f64.recip()
}

const fn default_budget_ms() -> u64 {
    4
}

const fn default_max_slices_per_tick() -> u32 {
    8
}

const fn default_sub_rate_hz() -> u32 {
    50
}

const fn default_max_sub_steps() -> u32 {
    4
}

const fn default_true() -> bool {
    true
}

const fn default_frames() -> u64 {
    600
}

const fn default_seed() -> u64 {
    42
}

const fn default_mean_frame_ms() -> f64 {
    16.0
}

const fn default_jitter_ms() -> f64 {
    6.0
}

const fn default_bodies() -> u32 {
    64
}

const fn default_agents() -> u32 {
    2_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

//! Sub-simulation run controller.
//!
//! A small state machine layered above the fixed tick stream:
//!
//! ```text
//! Disabled -> RunForTicks(remaining, max)       -> Disabled
//! Disabled -> RunUntilQuiescent(max, elapsed)   -> Disabled
//! ```
//!
//! The controller writes the shared [`RatePolicy`]; the
//! [`SubStepper`](crate::substep::SubStepper) that owns it reads the policy
//! and reports every completed sub-tick back through
//! [`RunController::after_fixed_tick`].

use std::fmt;
use std::sync::Arc;

use cadence_types::{CompletionReason, RunMode, RunNotification, RunStatus};
use tracing::{debug, error, info};

use crate::notify::NotificationSink;
use crate::policy::RatePolicy;
use crate::rate::{self, RateError};

/// Errors from run controller calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    /// A bounded run was requested with fewer than one tick.
    #[error("run tick count must be at least 1, got {requested}")]
    InvalidTickCount {
        /// The rejected count.
        requested: u64,
    },

    /// The configured default rate is 0 Hz, so "enable" would disable.
    #[error("default sub-simulation rate must be at least 1 Hz")]
    ZeroDefaultRate,

    /// The rate policy rejected a setting.
    #[error("rate policy rejected setting: {source}")]
    Rate {
        /// Underlying rate error.
        #[from]
        source: RateError,
    },
}

/// "Is the sub-simulated world still active?"
///
/// Consumed only by run-until-quiescent requests.
pub trait QuiescenceProbe {
    /// Whether anything in the world is still moving.
    fn is_active(&self) -> bool;
}

impl<F: Fn() -> bool> QuiescenceProbe for F {
    fn is_active(&self) -> bool {
        self()
    }
}

/// An in-flight bounded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    /// Which kind of run this is.
    pub mode: RunMode,
    /// Ticks left before a fixed-count run completes.
    pub remaining: u64,
    /// Tick ceiling.
    pub max: u64,
    /// Sub-ticks completed so far.
    pub elapsed: u64,
}

/// Enables, disables, and bounds a sub-simulation.
pub struct RunController {
    policy: Arc<RatePolicy>,
    default_rate_hz: u32,
    request: Option<RunRequest>,
    sink: Box<dyn NotificationSink>,
}

impl RunController {
    /// Create a controller writing to `policy`.
    ///
    /// `default_rate_hz` is used whenever a caller enables without a rate.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::ZeroDefaultRate`] for a 0 Hz default, or
    /// [`RunError::Rate`] if the default does not fit under the policy's
    /// sub-step cap.
    pub fn new(
        policy: Arc<RatePolicy>,
        default_rate_hz: u32,
        sink: Box<dyn NotificationSink>,
    ) -> Result<Self, RunError> {
        if default_rate_hz == 0 {
            return Err(RunError::ZeroDefaultRate);
        }
        rate::check_cap(
            default_rate_hz,
            policy.fixed_rate(),
            policy.max_sub_steps(),
        )?;
        Ok(Self {
            policy,
            default_rate_hz,
            request: None,
            sink,
        })
    }

    /// Switch the sub-simulation on and return the rate it now runs at.
    ///
    /// `None` or `Some(0)` falls back to the default rate.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Rate`] if the rate needs more sub-steps per fixed
    /// tick than the policy allows. Nothing is notified in that case.
    pub fn enable(&mut self, rate_hz: Option<u32>) -> Result<u32, RunError> {
        let rate_hz = match rate_hz {
            Some(hz) if hz > 0 => hz,
            _ => self.default_rate_hz,
        };
        self.policy.set_target_rate(rate_hz)?;
        info!(rate_hz, "Sub-simulation enabled");
        self.sink.notify(&RunNotification::Enabled { rate_hz });
        Ok(rate_hz)
    }

    /// Switch the sub-simulation off and drop any in-flight run.
    pub fn disable(&mut self) {
        self.zero_target_rate();
        if let Some(request) = self.request.take() {
            debug!(
                mode = ?request.mode,
                elapsed = request.elapsed,
                "Run request cancelled"
            );
        }
        info!("Sub-simulation disabled");
        self.sink.notify(&RunNotification::Disabled);
    }

    /// Run for exactly `ticks` sub-ticks, then switch off.
    ///
    /// Replaces any run already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::InvalidTickCount`] for 0, or [`RunError::Rate`]
    /// if enabling at the default rate fails.
    pub fn run_for_fixed_ticks(&mut self, ticks: u64) -> Result<(), RunError> {
        self.start(RunMode::RunForTicks, ticks)
    }

    /// Run until the world reports quiescence, or `max_ticks` is exceeded.
    ///
    /// Replaces any run already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::InvalidTickCount`] for 0, or [`RunError::Rate`]
    /// if enabling at the default rate fails.
    pub fn run_until_sleeping(&mut self, max_ticks: u64) -> Result<(), RunError> {
        self.start(RunMode::RunUntilQuiescent, max_ticks)
    }

    fn start(&mut self, mode: RunMode, max_ticks: u64) -> Result<(), RunError> {
        if max_ticks == 0 {
            return Err(RunError::InvalidTickCount {
                requested: max_ticks,
            });
        }
        if !self.policy.is_enabled() {
            self.enable(None)?;
        }
        self.request = Some(RunRequest {
            mode,
            remaining: if mode == RunMode::RunForTicks {
                max_ticks
            } else {
                0
            },
            max: max_ticks,
            elapsed: 0,
        });
        info!(?mode, max_ticks, "Sub-simulation run started");
        self.sink
            .notify(&RunNotification::RunStarted { mode, max_ticks });
        Ok(())
    }

    /// Record one completed sub-tick.
    ///
    /// Returns the completion reason if this tick ended the run. Does
    /// nothing when no run is in flight.
    pub fn after_fixed_tick(&mut self, probe: &dyn QuiescenceProbe) -> Option<CompletionReason> {
        let request = self.request.as_mut()?;
        request.elapsed = request.elapsed.saturating_add(1);

        let reason = if request.elapsed > request.max {
            Some(CompletionReason::MaxTicksExceeded)
        } else {
            match request.mode {
                RunMode::RunUntilQuiescent if !probe.is_active() => {
                    Some(CompletionReason::Quiescent)
                }
                RunMode::RunForTicks => {
                    request.remaining = request.remaining.saturating_sub(1);
                    (request.remaining == 0).then_some(CompletionReason::TicksReached)
                }
                RunMode::RunUntilQuiescent | RunMode::Disabled => None,
            }
        };

        if let Some(reason) = reason {
            self.complete(reason);
        }
        reason
    }

    fn complete(&mut self, reason: CompletionReason) {
        let elapsed_ticks = self.request.take().map_or(0, |r| r.elapsed);
        self.zero_target_rate();
        info!(
            reason = reason.as_str(),
            elapsed_ticks, "Sub-simulation run completed"
        );
        self.sink.notify(&RunNotification::RunCompleted {
            reason,
            elapsed_ticks,
        });
    }

    fn zero_target_rate(&self) {
        // 0 Hz needs no sub-steps, so this only fails on a broken policy.
        if let Err(err) = self.policy.set_target_rate(0) {
            error!(error = %err, "Failed to zero sub-simulation rate");
        }
    }

    /// Whether a bounded run is in flight.
    pub const fn is_running(&self) -> bool {
        self.request.is_some()
    }

    /// The in-flight run, if any.
    pub const fn request(&self) -> Option<&RunRequest> {
        self.request.as_ref()
    }

    /// Rate used when enabling without an explicit rate.
    pub const fn default_rate_hz(&self) -> u32 {
        self.default_rate_hz
    }

    /// The policy this controller writes.
    pub const fn policy(&self) -> &Arc<RatePolicy> {
        &self.policy
    }

    /// Serializable snapshot of the run state.
    pub fn status(&self) -> RunStatus {
        let request = self.request.unwrap_or(RunRequest {
            mode: RunMode::Disabled,
            remaining: 0,
            max: 0,
            elapsed: 0,
        });
        RunStatus {
            mode: request.mode,
            remaining_ticks: request.remaining,
            max_ticks: request.max,
            elapsed_ticks: request.elapsed,
            target_rate_hz: self.policy.target_rate_hz(),
        }
    }
}

impl fmt::Debug for RunController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunController")
            .field("policy", &self.policy)
            .field("default_rate_hz", &self.default_rate_hz)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

//! Messages emitted by the sub-simulation run controller.
//!
//! The set is closed on purpose: sinks match on these shapes instead of
//! looking up string keys in a generic event bus.

use serde::{Deserialize, Serialize};

use crate::enums::{CompletionReason, RunMode};

/// A lifecycle notification from a sub-simulation run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunNotification {
    /// The sub-simulation was switched on.
    Enabled {
        /// Target rate the sub-simulation now ticks at, in Hz.
        rate_hz: u32,
    },
    /// The sub-simulation was switched off and any run request dropped.
    Disabled,
    /// A bounded run request was accepted.
    RunStarted {
        /// Which kind of run was started.
        mode: RunMode,
        /// Tick ceiling of the run.
        max_ticks: u64,
    },
    /// A run request finished.
    RunCompleted {
        /// Why the run ended.
        reason: CompletionReason,
        /// Sub-ticks that elapsed while the run was active.
        elapsed_ticks: u64,
    },
}

impl RunNotification {
    /// Returns the completion reason if this is a `RunCompleted` message.
    pub const fn completion(&self) -> Option<(CompletionReason, u64)> {
        match *self {
            Self::RunCompleted {
                reason,
                elapsed_ticks,
            } => Some((reason, elapsed_ticks)),
            _ => None,
        }
    }
}

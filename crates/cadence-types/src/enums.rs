//! Enumeration types shared across the scheduler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which pacemaker variant is currently driving the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Wall-clock time is accumulated and converted into fixed ticks.
    #[default]
    Continuous,
    /// Wall-clock time is ignored; ticks run only when explicitly queued.
    TurnBased,
}

/// Result of one call into the cooperative step executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Every unit of every phase ran; the tick is finished.
    Complete,
    /// The budget ran out (or a sliced unit yielded); call again to resume.
    Incomplete,
}

impl StepOutcome {
    /// Returns `true` for [`StepOutcome::Complete`].
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// Lifecycle state of a sub-simulation run request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// No run is in flight.
    #[default]
    Disabled,
    /// Run for a fixed number of sub-ticks.
    RunForTicks,
    /// Run until the sub-simulated world reports it has gone quiet.
    RunUntilQuiescent,
}

/// Why a sub-simulation run finished.
///
/// Serializes as the bare variant name (`"TicksReached"`, ...), which is the
/// wire form notification consumers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionReason {
    /// The run hit its tick ceiling before any other condition was met.
    MaxTicksExceeded,
    /// The quiescence probe reported no remaining activity.
    Quiescent,
    /// A fixed-count run consumed all of its ticks.
    TicksReached,
}

impl CompletionReason {
    /// Stable string form of the reason.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MaxTicksExceeded => "MaxTicksExceeded",
            Self::Quiescent => "Quiescent",
            Self::TicksReached => "TicksReached",
        }
    }
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn completion_reason_serializes_as_variant_name() {
        let json = serde_json::to_string(&CompletionReason::TicksReached).unwrap();
        assert_eq!(json, "\"TicksReached\"");
        assert_eq!(CompletionReason::Quiescent.to_string(), "Quiescent");
    }

    #[test]
    fn loop_mode_uses_snake_case() {
        let json = serde_json::to_string(&LoopMode::TurnBased).unwrap();
        assert_eq!(json, "\"turn_based\"");
        assert_eq!(LoopMode::default(), LoopMode::Continuous);
    }

    #[test]
    fn step_outcome_predicate() {
        assert!(StepOutcome::Complete.is_complete());
        assert!(!StepOutcome::Incomplete.is_complete());
    }
}

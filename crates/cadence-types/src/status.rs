//! Per-frame reports and point-in-time status snapshots.

use serde::{Deserialize, Serialize};

use crate::enums::{LoopMode, RunMode};

/// What a single `advance` call on a pacemaker did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameReport {
    /// Fixed ticks that finished during this call.
    pub ticks_completed: u32,
    /// Cooperative executor calls made during this call.
    pub slices: u32,
    /// A cooperative tick is still in flight and will resume next call.
    pub suspended: bool,
    /// The budget fuse is set; the pacemaker is halted until reset.
    pub fused: bool,
    /// Ticks discarded by the catch-up cap during this call.
    pub dropped_ticks: u64,
}

impl FrameReport {
    /// Fold another report into this one (used when a controller drives
    /// more than one pacemaker in a frame).
    pub const fn merge(&mut self, other: &Self) {
        self.ticks_completed = self.ticks_completed.saturating_add(other.ticks_completed);
        self.slices = self.slices.saturating_add(other.slices);
        self.suspended = self.suspended || other.suspended;
        self.fused = self.fused || other.fused;
        self.dropped_ticks = self.dropped_ticks.saturating_add(other.dropped_ticks);
    }
}

/// Snapshot of a pacemaker's observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacemakerStatus {
    /// Which variant produced the snapshot.
    pub mode: LoopMode,
    /// Fixed tick rate in Hz.
    pub fixed_hz: u32,
    /// Fixed ticks completed since construction.
    pub total_ticks: u64,
    /// Simulated seconds (`total_ticks / fixed_hz`).
    pub sim_time_seconds: f64,
    /// Wall-clock seconds waiting to become ticks (continuous only).
    pub accumulator_seconds: f64,
    /// Queued but not yet run ticks (turn-based only).
    pub pending_ticks: u64,
    /// Render interpolation factor in `[0, 1]`.
    pub alpha: f64,
    /// Whether the budget fuse has tripped.
    pub fused: bool,
    /// Incomplete cooperative slices spent on the current tick.
    pub slice_count: u32,
}

/// Snapshot of a sub-simulation run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Current run mode.
    pub mode: RunMode,
    /// Ticks left in a fixed-count run (0 otherwise).
    pub remaining_ticks: u64,
    /// Tick ceiling of the current run.
    pub max_ticks: u64,
    /// Sub-ticks elapsed in the current run.
    pub elapsed_ticks: u64,
    /// Target rate currently published on the rate policy.
    pub target_rate_hz: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_counts_and_flags() {
        let mut a = FrameReport {
            ticks_completed: 2,
            slices: 1,
            ..FrameReport::default()
        };
        let b = FrameReport {
            ticks_completed: 1,
            slices: 3,
            suspended: true,
            fused: false,
            dropped_ticks: 4,
        };
        a.merge(&b);
        assert_eq!(a.ticks_completed, 3);
        assert_eq!(a.slices, 4);
        assert!(a.suspended);
        assert!(!a.fused);
        assert_eq!(a.dropped_ticks, 4);
    }
}

//! Loop controller: picks which pacemaker drives the simulation.
//!
//! The controller owns one [`ContinuousPacemaker`] and one
//! [`TurnBasedPacemaker`] and forwards each frame to whichever is active.
//! Pausing is just switching to turn-based mode: wall-clock time stops
//! turning into ticks, and ticks run only when explicitly requested with
//! [`LoopController::advance_ticks`].
//!
//! Each pacemaker keeps its own accumulator and fuse. Time that passes while
//! paused is never fed to the continuous pacemaker, so resuming does not
//! produce a burst of catch-up ticks.
//!
//! A cooperative tick belongs to the pacemaker that started it. If the mode
//! changes while that tick is suspended, the next cooperative frames go to
//! the owner until the tick completes, so its due time (or queued request)
//! and its slices are settled on the owner's books. The active pacemaker
//! only accrues wall-clock time during those frames.

use std::sync::Arc;

use cadence_types::{FrameReport, LoopMode, PacemakerStatus};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::executor::CooperativeExecutor;
use crate::pacemaker::{Budget, ContinuousPacemaker, Pacemaker, TickTarget, TurnBasedPacemaker};
use crate::rate::FixedRate;

/// Runtime switch between the continuous and turn-based pacemakers.
pub struct LoopController {
    continuous: ContinuousPacemaker,
    turn_based: TurnBasedPacemaker,
    mode: LoopMode,
    in_flight: Option<LoopMode>,
}

impl LoopController {
    /// Create a controller in continuous mode, both pacemakers sharing
    /// `clock` and `fixed`.
    pub fn new(fixed: FixedRate, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(
            ContinuousPacemaker::new(fixed, Arc::clone(&clock)),
            TurnBasedPacemaker::new(fixed, clock),
        )
    }

    /// Create a controller from pre-built pacemakers (for example, a
    /// continuous pacemaker with a catch-up cap).
    pub const fn from_parts(continuous: ContinuousPacemaker, turn_based: TurnBasedPacemaker) -> Self {
        Self {
            continuous,
            turn_based,
            mode: LoopMode::Continuous,
            in_flight: None,
        }
    }

    /// Run one frame on the active pacemaker.
    ///
    /// With a cooperative target, a tick suspended under the other mode is
    /// finished by its owner first; no new tick starts in that frame.
    pub fn frame(&mut self, wall_dt: f64, target: TickTarget<'_>) -> FrameReport {
        match target {
            TickTarget::Cooperative { executor, budget } => {
                self.frame_cooperative(wall_dt, executor, budget)
            }
            direct @ TickTarget::Direct(_) => self.active_mut().advance(wall_dt, direct),
        }
    }

    fn frame_cooperative(
        &mut self,
        wall_dt: f64,
        executor: &mut CooperativeExecutor,
        budget: Budget,
    ) -> FrameReport {
        if !executor.is_active() {
            self.in_flight = None;
        }
        let runner = match self.in_flight {
            Some(owner) if owner != self.mode => owner,
            _ => self.mode,
        };

        let report = if runner == self.mode {
            self.active_mut()
                .advance(wall_dt, TickTarget::cooperative(executor, budget))
        } else {
            debug!(
                owner = ?runner,
                active = ?self.mode,
                "Finishing tick started before mode switch"
            );
            self.active_mut().accrue(wall_dt);
            self.pacemaker_mut(runner).finish_in_flight(executor, budget)
        };

        self.in_flight = executor.is_active().then_some(runner);
        report
    }

    /// Switch pacemakers. Switching to the current mode is a no-op.
    pub fn set_mode(&mut self, mode: LoopMode) {
        if self.mode == mode {
            return;
        }
        info!(from = ?self.mode, to = ?mode, total_ticks = self.total_ticks(), "Switching loop mode");
        self.mode = mode;
    }

    /// Stop converting wall-clock time into ticks.
    pub fn pause(&mut self) {
        self.set_mode(LoopMode::TurnBased);
    }

    /// Resume real-time ticking.
    pub fn resume(&mut self) {
        self.set_mode(LoopMode::Continuous);
    }

    /// Whether the controller is in turn-based mode.
    pub fn is_paused(&self) -> bool {
        self.mode == LoopMode::TurnBased
    }

    /// Queue exactly `count` ticks on the turn-based pacemaker, pausing
    /// real-time ticking first if necessary. The ticks run on the next
    /// [`frame`](Self::frame) calls.
    pub fn advance_ticks(&mut self, count: u64) {
        self.pause();
        self.turn_based.step_many(count);
    }

    /// Clear the fuse and backlog on both pacemakers.
    ///
    /// Pass the executor to discard a tick left in flight; its due time has
    /// just been cleared, so it must not be resumed. Without it, an active
    /// executor is resumed by whichever pacemaker runs next.
    pub fn reset(&mut self, executor: Option<&mut CooperativeExecutor>) {
        self.continuous.reset();
        self.turn_based.reset();
        if let Some(executor) = executor.filter(|e| e.is_active()) {
            executor.reset();
        }
        self.in_flight = None;
    }

    /// Mode of the pacemaker that owns the suspended cooperative tick, if
    /// one is in flight.
    pub const fn in_flight_owner(&self) -> Option<LoopMode> {
        self.in_flight
    }

    /// The active mode.
    pub const fn mode(&self) -> LoopMode {
        self.mode
    }

    /// Render interpolation factor from the active pacemaker.
    pub fn alpha(&self) -> f64 {
        self.active().alpha()
    }

    /// Whether the active pacemaker's fuse has tripped.
    pub fn is_fused(&self) -> bool {
        self.active().is_fused()
    }

    /// Ticks completed by both pacemakers together.
    pub fn total_ticks(&self) -> u64 {
        self.continuous
            .total_ticks()
            .saturating_add(self.turn_based.total_ticks())
    }

    /// Status of the active pacemaker, with `total_ticks` and simulation
    /// time covering both pacemakers.
    pub fn status(&self) -> PacemakerStatus {
        let mut status = self.active().status();
        status.total_ticks = self.total_ticks();
        status.sim_time_seconds = self
            .continuous
            .fixed_rate()
            .seconds_for_ticks(status.total_ticks);
        status
    }

    /// The continuous pacemaker.
    pub const fn continuous(&self) -> &ContinuousPacemaker {
        &self.continuous
    }

    /// The turn-based pacemaker.
    pub const fn turn_based(&self) -> &TurnBasedPacemaker {
        &self.turn_based
    }

    /// Mutable access to the turn-based pacemaker (for queuing steps
    /// without pausing).
    pub const fn turn_based_mut(&mut self) -> &mut TurnBasedPacemaker {
        &mut self.turn_based
    }

    fn active(&self) -> &dyn Pacemaker {
        match self.mode {
            LoopMode::Continuous => &self.continuous,
            LoopMode::TurnBased => &self.turn_based,
        }
    }

    fn active_mut(&mut self) -> &mut dyn Pacemaker {
        self.pacemaker_mut(self.mode)
    }

    fn pacemaker_mut(&mut self, mode: LoopMode) -> &mut dyn Pacemaker {
        match mode {
            LoopMode::Continuous => &mut self.continuous,
            LoopMode::TurnBased => &mut self.turn_based,
        }
    }
}

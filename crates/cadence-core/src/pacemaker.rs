//! Pacemakers: turning wall-clock time (or explicit requests) into ticks.
//!
//! Two variants share one dispatch core:
//!
//! - [`ContinuousPacemaker`] accumulates wall-clock deltas and runs a fixed
//!   tick every time a full tick's worth has built up.
//! - [`TurnBasedPacemaker`] ignores wall-clock time and runs exactly one
//!   tick per queued step request.
//!
//! Each tick goes to a [`TickTarget`]: either straight to a
//! [`SimulationGroup`], or through a [`CooperativeExecutor`] under a
//! [`Budget`].
//!
//! # Budgeted dispatch
//!
//! 1. A tick left in flight by the previous call is resumed first; a new
//!    tick starts only if one is due.
//! 2. The call gets one deadline, `now + budget`.
//! 3. The executor is stepped with the time left until the deadline (never
//!    less than 1 ms, so every call makes progress).
//! 4. A complete step consumes one due tick and advances simulation time.
//! 5. An incomplete step ends the call. It also counts as one slice of the
//!    current tick; when the slices reach `max_slices` the **budget fuse**
//!    trips: a warning is logged, the executor is reset (partial progress
//!    for the tick is discarded), and the pacemaker stops advancing until
//!    [`Pacemaker::reset`] is called.
//!
//! The fuse is fault containment, not an error: it stops a scheduler that
//! cannot keep up from falling further behind every frame.

use std::sync::Arc;
use std::time::Duration;

use cadence_types::{FrameReport, LoopMode, PacemakerStatus, StepOutcome};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::executor::{CooperativeExecutor, MIN_STEP_BUDGET};
use crate::rate::FixedRate;

/// Tolerance, in ticks, when deciding whether the accumulator holds a full
/// tick. Absorbs float error from summing deltas like `1/60`.
const TICK_EPSILON: f64 = 1e-9;

/// Anything that can apply one fixed tick of simulation in a single call.
pub trait SimulationGroup {
    /// Apply one tick of `fixed_dt` seconds.
    fn run_tick(&mut self, fixed_dt: f64);
}

impl<F: FnMut(f64)> SimulationGroup for F {
    fn run_tick(&mut self, fixed_dt: f64) {
        self(fixed_dt);
    }
}

/// Time budget and slice allowance for cooperative ticks.
///
/// The time bounds the slices of a single tick, not the frame: once a tick
/// completes, further due ticks still start (each with at least 1 ms), so a
/// backlog of plain-unit ticks can all run inside one `advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    time: Duration,
    max_slices: u32,
}

impl Budget {
    /// Build a budget from milliseconds.
    ///
    /// A budget of 0 ms is raised to 1 ms and `max_slices` of 0 is raised
    /// to 1 (the tick must then finish in one slice or fuse).
    pub fn new(budget_ms: u64, max_slices: u32) -> Self {
        Self::from_duration(Duration::from_millis(budget_ms), max_slices)
    }

    /// Build a budget from a [`Duration`], with the same coercions as
    /// [`Budget::new`].
    pub fn from_duration(time: Duration, max_slices: u32) -> Self {
        Self {
            time: time.max(MIN_STEP_BUDGET),
            max_slices: max_slices.max(1),
        }
    }

    /// Time allowed per `advance` call.
    pub const fn time(&self) -> Duration {
        self.time
    }

    /// Incomplete slices allowed per tick before the fuse trips.
    pub const fn max_slices(&self) -> u32 {
        self.max_slices
    }
}

/// Where a pacemaker sends each fixed tick.
pub enum TickTarget<'a> {
    /// Call the group once per tick, unconditionally in full.
    Direct(&'a mut dyn SimulationGroup),
    /// Step the executor within the budget, resuming across calls.
    Cooperative {
        /// The executor holding the phase pipeline.
        executor: &'a mut CooperativeExecutor,
        /// Budget for each `advance` call.
        budget: Budget,
    },
}

impl<'a> TickTarget<'a> {
    /// Shorthand for [`TickTarget::Direct`].
    pub const fn direct(group: &'a mut dyn SimulationGroup) -> Self {
        Self::Direct(group)
    }

    /// Shorthand for [`TickTarget::Cooperative`].
    pub const fn cooperative(executor: &'a mut CooperativeExecutor, budget: Budget) -> Self {
        Self::Cooperative { executor, budget }
    }
}

/// Common interface of the two pacemaker variants.
pub trait Pacemaker {
    /// Which variant this is.
    fn mode(&self) -> LoopMode;

    /// Feed one frame's wall-clock delta and run whatever ticks are due.
    fn advance(&mut self, wall_dt: f64, target: TickTarget<'_>) -> FrameReport;

    /// Clear the budget fuse and any backlog.
    fn reset(&mut self);

    /// Take in one frame's wall-clock delta without running any ticks.
    fn accrue(&mut self, wall_dt: f64);

    /// Resume a tick this pacemaker left in flight on `executor` and stop
    /// once it completes or suspends again. Never starts a new tick.
    ///
    /// The tick's due time or queued request is consumed here, and its
    /// slices count toward this pacemaker's fuse.
    fn finish_in_flight(
        &mut self,
        executor: &mut CooperativeExecutor,
        budget: Budget,
    ) -> FrameReport;

    /// Render interpolation factor in `[0, 1]`. Observational only.
    fn alpha(&self) -> f64;

    /// Whether the budget fuse has tripped.
    fn is_fused(&self) -> bool;

    /// Fixed ticks completed since construction.
    fn total_ticks(&self) -> u64;

    /// The fixed tick rate.
    fn fixed_rate(&self) -> FixedRate;

    /// Snapshot of observable state.
    fn status(&self) -> PacemakerStatus;
}

/// Source of due ticks for the dispatch core.
trait DueTicks {
    /// Whether at least one tick is due.
    fn is_due(&self) -> bool;
    /// Consume one due tick (saturating if none is due).
    fn consume(&mut self);
}

/// Wall-clock time waiting to become ticks.
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    seconds: f64,
    fixed: FixedRate,
}

impl Accumulator {
    /// Accumulated time expressed in ticks.
    fn in_ticks(&self) -> f64 {
        self.seconds * f64::from(self.fixed.hz())
    }

    /// Whole ticks currently due.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn whole_ticks(&self) -> u64 {
        // Non-negative by construction; `as` saturates on huge values.
        (self.in_ticks() + TICK_EPSILON).floor().max(0.0) as u64
    }
}

impl DueTicks for Accumulator {
    fn is_due(&self) -> bool {
        self.in_ticks() + TICK_EPSILON >= 1.0
    }

    fn consume(&mut self) {
        self.seconds = (self.seconds - self.fixed.delta_seconds()).max(0.0);
    }
}

/// Queued turn-based step requests.
#[derive(Debug, Clone, Copy, Default)]
struct PendingTicks(u64);

impl DueTicks for PendingTicks {
    fn is_due(&self) -> bool {
        self.0 > 0
    }

    fn consume(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }
}

/// State and dispatch logic shared by both pacemaker variants.
struct TickCore {
    fixed: FixedRate,
    clock: Arc<dyn Clock>,
    total_ticks: u64,
    slice_count: u32,
    fused: bool,
}

impl TickCore {
    fn new(fixed: FixedRate, clock: Arc<dyn Clock>) -> Self {
        Self {
            fixed,
            clock,
            total_ticks: 0,
            slice_count: 0,
            fused: false,
        }
    }

    fn drive(&mut self, due: &mut dyn DueTicks, target: TickTarget<'_>) -> FrameReport {
        match target {
            TickTarget::Direct(group) => self.drive_direct(due, group),
            TickTarget::Cooperative { executor, budget } => {
                self.drive_cooperative(due, executor, budget, true)
            }
        }
    }

    fn drive_direct(
        &mut self,
        due: &mut dyn DueTicks,
        group: &mut dyn SimulationGroup,
    ) -> FrameReport {
        let mut report = FrameReport::default();
        let fixed_dt = self.fixed.delta_seconds();
        while due.is_due() {
            group.run_tick(fixed_dt);
            due.consume();
            self.complete_tick(&mut report);
        }
        report
    }

    fn drive_cooperative(
        &mut self,
        due: &mut dyn DueTicks,
        executor: &mut CooperativeExecutor,
        budget: Budget,
        start_new: bool,
    ) -> FrameReport {
        let mut report = FrameReport::default();
        if self.fused {
            report.fused = true;
            return report;
        }

        let fixed_dt = self.fixed.delta_seconds();
        let deadline = self.clock.now().saturating_add(budget.time());

        loop {
            if !executor.is_active() && !(start_new && due.is_due()) {
                break;
            }

            let remaining = deadline
                .saturating_sub(self.clock.now())
                .max(MIN_STEP_BUDGET);
            report.slices = report.slices.saturating_add(1);

            match executor.step(fixed_dt, remaining, self.clock.as_ref()) {
                StepOutcome::Complete => {
                    due.consume();
                    self.slice_count = 0;
                    self.complete_tick(&mut report);
                }
                StepOutcome::Incomplete => {
                    self.slice_count = self.slice_count.saturating_add(1);
                    if self.slice_count >= budget.max_slices() {
                        self.trip_fuse(executor, budget);
                        report.fused = true;
                    } else {
                        debug!(
                            tick = self.total_ticks.saturating_add(1),
                            slice = self.slice_count,
                            "Cooperative tick suspended"
                        );
                        report.suspended = true;
                    }
                    break;
                }
            }
        }
        report
    }

    fn complete_tick(&mut self, report: &mut FrameReport) {
        self.total_ticks = self.total_ticks.saturating_add(1);
        report.ticks_completed = report.ticks_completed.saturating_add(1);
    }

    fn trip_fuse(&mut self, executor: &mut CooperativeExecutor, budget: Budget) {
        let cursor = executor.cursor();
        warn!(
            tick = self.total_ticks.saturating_add(1),
            slices = self.slice_count,
            max_slices = budget.max_slices(),
            budget_ms = budget.time().as_millis(),
            phase_index = cursor.phase_index(),
            unit_index = cursor.unit_index(),
            "Budget fuse tripped: cooperative tick did not finish within its slices; \
             halting until reset"
        );
        executor.reset();
        self.fused = true;
        self.slice_count = 0;
    }

    fn reset(&mut self) {
        if self.fused {
            debug!(total_ticks = self.total_ticks, "Clearing budget fuse");
        }
        self.fused = false;
        self.slice_count = 0;
    }

    fn sim_time_seconds(&self) -> f64 {
        self.fixed.seconds_for_ticks(self.total_ticks)
    }
}

/// Real-time pacemaker: wall-clock deltas in, fixed ticks out.
pub struct ContinuousPacemaker {
    core: TickCore,
    accumulator: Accumulator,
    max_ticks_per_frame: u32,
}

impl ContinuousPacemaker {
    /// Create a continuous pacemaker with no catch-up cap.
    pub fn new(fixed: FixedRate, clock: Arc<dyn Clock>) -> Self {
        Self {
            core: TickCore::new(fixed, clock),
            accumulator: Accumulator {
                seconds: 0.0,
                fixed,
            },
            max_ticks_per_frame: 0,
        }
    }

    /// Limit how many ticks may be due after one frame; excess backlog is
    /// dropped. 0 means unlimited.
    #[must_use]
    pub const fn with_max_ticks_per_frame(mut self, max_ticks_per_frame: u32) -> Self {
        self.max_ticks_per_frame = max_ticks_per_frame;
        self
    }

    /// Wall-clock seconds not yet turned into ticks.
    pub const fn accumulator_seconds(&self) -> f64 {
        self.accumulator.seconds
    }

    /// Drop backlog beyond the catch-up cap. Returns the ticks dropped.
    #[allow(clippy::cast_precision_loss)]
    fn enforce_catch_up_cap(&mut self) -> u64 {
        if self.max_ticks_per_frame == 0 {
            return 0;
        }
        let due = self.accumulator.whole_ticks();
        let cap = u64::from(self.max_ticks_per_frame);
        if due <= cap {
            return 0;
        }
        let dropped = due.saturating_sub(cap);
        let delta = self.core.fixed.delta_seconds();
        self.accumulator.seconds = (self.accumulator.seconds - dropped as f64 * delta).max(0.0);
        warn!(
            due,
            cap,
            dropped,
            "Continuous pacemaker fell behind; dropping backlog"
        );
        dropped
    }
}

impl Pacemaker for ContinuousPacemaker {
    fn mode(&self) -> LoopMode {
        LoopMode::Continuous
    }

    fn advance(&mut self, wall_dt: f64, target: TickTarget<'_>) -> FrameReport {
        if self.core.fused {
            return FrameReport {
                fused: true,
                ..FrameReport::default()
            };
        }
        self.accrue(wall_dt);

        let dropped_ticks = self.enforce_catch_up_cap();
        let mut report = self.core.drive(&mut self.accumulator, target);
        report.dropped_ticks = dropped_ticks;
        report
    }

    fn reset(&mut self) {
        self.core.reset();
        self.accumulator.seconds = 0.0;
    }

    fn accrue(&mut self, wall_dt: f64) {
        if self.core.fused {
            return;
        }
        if wall_dt.is_finite() && wall_dt > 0.0 {
            self.accumulator.seconds += wall_dt;
        } else if wall_dt < 0.0 || !wall_dt.is_finite() {
            debug!(wall_dt, "Ignoring negative or non-finite frame delta");
        }
    }

    fn finish_in_flight(
        &mut self,
        executor: &mut CooperativeExecutor,
        budget: Budget,
    ) -> FrameReport {
        self.core
            .drive_cooperative(&mut self.accumulator, executor, budget, false)
    }

    fn alpha(&self) -> f64 {
        self.accumulator.in_ticks().clamp(0.0, 1.0)
    }

    fn is_fused(&self) -> bool {
        self.core.fused
    }

    fn total_ticks(&self) -> u64 {
        self.core.total_ticks
    }

    fn fixed_rate(&self) -> FixedRate {
        self.core.fixed
    }

    fn status(&self) -> PacemakerStatus {
        PacemakerStatus {
            mode: LoopMode::Continuous,
            fixed_hz: self.core.fixed.hz(),
            total_ticks: self.core.total_ticks,
            sim_time_seconds: self.core.sim_time_seconds(),
            accumulator_seconds: self.accumulator.seconds,
            pending_ticks: 0,
            alpha: self.alpha(),
            fused: self.core.fused,
            slice_count: self.core.slice_count,
        }
    }
}

/// Externally stepped pacemaker: one tick per queued request.
pub struct TurnBasedPacemaker {
    core: TickCore,
    pending: PendingTicks,
}

impl TurnBasedPacemaker {
    /// Create a turn-based pacemaker with nothing queued.
    pub fn new(fixed: FixedRate, clock: Arc<dyn Clock>) -> Self {
        Self {
            core: TickCore::new(fixed, clock),
            pending: PendingTicks::default(),
        }
    }

    /// Queue one tick.
    pub fn step(&mut self) {
        self.step_many(1);
    }

    /// Queue `count` ticks.
    pub fn step_many(&mut self, count: u64) {
        self.pending.0 = self.pending.0.saturating_add(count);
    }

    /// Ticks queued but not yet run.
    pub const fn pending_ticks(&self) -> u64 {
        self.pending.0
    }
}

impl Pacemaker for TurnBasedPacemaker {
    fn mode(&self) -> LoopMode {
        LoopMode::TurnBased
    }

    fn advance(&mut self, _wall_dt: f64, target: TickTarget<'_>) -> FrameReport {
        if self.core.fused {
            return FrameReport {
                fused: true,
                ..FrameReport::default()
            };
        }
        self.core.drive(&mut self.pending, target)
    }

    fn reset(&mut self) {
        self.core.reset();
        self.pending = PendingTicks::default();
    }

    fn accrue(&mut self, _wall_dt: f64) {}

    fn finish_in_flight(
        &mut self,
        executor: &mut CooperativeExecutor,
        budget: Budget,
    ) -> FrameReport {
        self.core
            .drive_cooperative(&mut self.pending, executor, budget, false)
    }

    fn alpha(&self) -> f64 {
        0.0
    }

    fn is_fused(&self) -> bool {
        self.core.fused
    }

    fn total_ticks(&self) -> u64 {
        self.core.total_ticks
    }

    fn fixed_rate(&self) -> FixedRate {
        self.core.fixed
    }

    fn status(&self) -> PacemakerStatus {
        PacemakerStatus {
            mode: LoopMode::TurnBased,
            fixed_hz: self.core.fixed.hz(),
            total_ticks: self.core.total_ticks,
            sim_time_seconds: self.core.sim_time_seconds(),
            accumulator_seconds: 0.0,
            pending_ticks: self.pending.0,
            alpha: self.alpha(),
            fused: self.core.fused,
            slice_count: self.core.slice_count,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::{Phase, SlicedUnit, Unit};

    fn rate(hz: u32) -> FixedRate {
        FixedRate::from_hz(hz).unwrap()
    }

    fn continuous(hz: u32) -> (ContinuousPacemaker, ManualClock) {
        let clock = ManualClock::new();
        let pm = ContinuousPacemaker::new(rate(hz), Arc::new(clock.clone()));
        (pm, clock)
    }

    /// Sliced unit that never finishes.
    struct Stuck {
        resets: Rc<RefCell<u32>>,
    }

    impl SlicedUnit for Stuck {
        fn update_slice(&mut self, _dt: f64, _remaining: Duration) -> bool {
            false
        }
        fn reset_slice(&mut self) {
            *self.resets.borrow_mut() += 1;
        }
    }

    #[test]
    fn budget_coerces_degenerate_values() {
        let budget = Budget::new(0, 0);
        assert_eq!(budget.time(), Duration::from_millis(1));
        assert_eq!(budget.max_slices(), 1);
    }

    #[test]
    fn direct_ticks_follow_accumulated_time() {
        let (mut pm, _clock) = continuous(50);
        let mut ticks = 0_u32;
        let mut group = |_dt: f64| ticks += 1;

        let report = pm.advance(0.015, TickTarget::direct(&mut group));
        assert_eq!(report.ticks_completed, 0);
        let report = pm.advance(0.015, TickTarget::direct(&mut group));
        assert_eq!(report.ticks_completed, 1);
        let report = pm.advance(0.050, TickTarget::direct(&mut group));
        assert_eq!(report.ticks_completed, 3);
        drop(group);
        assert_eq!(ticks, 4);
        assert_eq!(pm.total_ticks(), 4);
        assert!((pm.accumulator_seconds() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn exact_sixtieths_tick_once_per_frame() {
        let (mut pm, _clock) = continuous(60);
        let mut count = 0_u32;
        for _ in 0..600 {
            let mut group = |_dt: f64| count += 1;
            pm.advance(1.0 / 60.0, TickTarget::direct(&mut group));
        }
        assert_eq!(count, 600);
    }

    #[test]
    fn alpha_is_clamped_fraction_of_a_tick() {
        let (mut pm, _clock) = continuous(50);
        let mut group = |_dt: f64| {};
        pm.advance(0.01, TickTarget::direct(&mut group));
        assert!((pm.alpha() - 0.5).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&pm.alpha()));
    }

    #[test]
    fn negative_and_nan_deltas_are_ignored() {
        let (mut pm, _clock) = continuous(50);
        let mut group = |_dt: f64| {};
        pm.advance(-1.0, TickTarget::direct(&mut group));
        pm.advance(f64::NAN, TickTarget::direct(&mut group));
        assert_eq!(pm.accumulator_seconds(), 0.0);
    }

    #[test]
    fn catch_up_cap_drops_backlog() {
        let (pm, _clock) = continuous(50);
        let mut pm = pm.with_max_ticks_per_frame(3);
        let mut group = |_dt: f64| {};
        let report = pm.advance(0.2, TickTarget::direct(&mut group));
        assert_eq!(report.ticks_completed, 3);
        assert_eq!(report.dropped_ticks, 7);
        assert!(pm.accumulator_seconds() < 0.02);
    }

    #[test]
    fn cooperative_ticks_complete_when_budget_allows() {
        let (mut pm, clock) = continuous(50);
        let counter = Rc::new(RefCell::new(0_u32));
        let c = Rc::clone(&counter);
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("p").with_unit(Unit::from_fn("count", move |_| *c.borrow_mut() += 1)),
        ]);
        let report = pm.advance(
            0.045,
            TickTarget::cooperative(&mut exec, Budget::new(4, 3)),
        );
        assert_eq!(report.ticks_completed, 2);
        assert_eq!(report.slices, 2);
        assert!(!report.suspended);
        assert_eq!(*counter.borrow(), 2);
        assert_eq!(clock.now(), Duration::ZERO);
    }

    #[test]
    fn suspended_tick_resumes_next_frame_without_new_time() {
        let (mut pm, clock) = continuous(50);
        let worker = clock.clone();
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("p")
                .with_unit(Unit::from_fn("slow", move |_| worker.advance_ms(5)))
                .with_unit(Unit::from_fn("fast", |_| {})),
        ]);
        let budget = Budget::new(4, 4);

        let report = pm.advance(0.02, TickTarget::cooperative(&mut exec, budget));
        assert!(report.suspended);
        assert_eq!(report.ticks_completed, 0);
        assert!(exec.is_active());

        // No new wall time: the in-flight tick is still resumed.
        let report = pm.advance(0.0, TickTarget::cooperative(&mut exec, budget));
        assert_eq!(report.ticks_completed, 1);
        assert!(!exec.is_active());
        assert_eq!(pm.status().slice_count, 0);
    }

    #[test]
    fn finishing_in_flight_tick_starts_nothing_new() {
        let (mut pm, clock) = continuous(50);
        let worker = clock.clone();
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("p")
                .with_unit(Unit::from_fn("slow", move |_| worker.advance_ms(5)))
                .with_unit(Unit::from_fn("fast", |_| {})),
        ]);
        let budget = Budget::new(4, 4);

        let report = pm.advance(0.04, TickTarget::cooperative(&mut exec, budget));
        assert!(report.suspended);

        let report = pm.finish_in_flight(&mut exec, budget);
        assert_eq!(report.ticks_completed, 1);
        assert_eq!(report.slices, 1);
        assert!(!exec.is_active());
        assert!((pm.accumulator_seconds() - 0.02).abs() < 1e-9);

        // Nothing in flight: no-op.
        let report = pm.finish_in_flight(&mut exec, budget);
        assert_eq!(report.slices, 0);
        assert_eq!(pm.total_ticks(), 1);
    }

    #[test]
    fn accrue_adds_time_without_ticking() {
        let (mut pm, _clock) = continuous(50);
        pm.accrue(0.05);
        pm.accrue(-1.0);
        assert!((pm.accumulator_seconds() - 0.05).abs() < 1e-12);
        assert_eq!(pm.total_ticks(), 0);
    }

    #[test]
    fn fuse_trips_on_max_slice_and_halts_until_reset() {
        let (mut pm, _clock) = continuous(50);
        let resets = Rc::new(RefCell::new(0_u32));
        let mut exec = CooperativeExecutor::new(vec![Phase::new("p").with_unit(Unit::sliced(
            "stuck",
            Stuck {
                resets: Rc::clone(&resets),
            },
        ))]);
        let budget = Budget::new(4, 3);

        let first = pm.advance(0.02, TickTarget::cooperative(&mut exec, budget));
        assert!(first.suspended && !first.fused);
        let second = pm.advance(0.0, TickTarget::cooperative(&mut exec, budget));
        assert!(second.suspended && !second.fused);
        let third = pm.advance(0.0, TickTarget::cooperative(&mut exec, budget));
        assert!(third.fused);
        assert!(pm.is_fused());
        assert_eq!(*resets.borrow(), 1);
        assert!(!exec.is_active());

        let halted = pm.advance(1.0, TickTarget::cooperative(&mut exec, budget));
        assert_eq!(halted.slices, 0);
        assert!(halted.fused);
        assert_eq!(pm.total_ticks(), 0);

        pm.reset();
        assert!(!pm.is_fused());
        assert_eq!(pm.accumulator_seconds(), 0.0);
    }

    #[test]
    fn single_slice_allowance_fuses_immediately() {
        let (mut pm, _clock) = continuous(50);
        let mut exec = CooperativeExecutor::new(vec![Phase::new("p").with_unit(Unit::sliced(
            "stuck",
            Stuck {
                resets: Rc::default(),
            },
        ))]);
        let report = pm.advance(0.02, TickTarget::cooperative(&mut exec, Budget::new(4, 0)));
        assert!(report.fused);
        assert_eq!(report.slices, 1);
    }

    #[test]
    fn turn_based_ignores_wall_time_and_drains_queue() {
        let clock = ManualClock::new();
        let mut pm = TurnBasedPacemaker::new(rate(30), Arc::new(clock));
        let mut ticks = 0_u32;
        let mut group = |_dt: f64| ticks += 1;

        let report = pm.advance(10.0, TickTarget::direct(&mut group));
        assert_eq!(report.ticks_completed, 0);

        pm.step();
        pm.step_many(2);
        assert_eq!(pm.pending_ticks(), 3);
        let report = pm.advance(0.0, TickTarget::direct(&mut group));
        assert_eq!(report.ticks_completed, 3);
        assert_eq!(pm.pending_ticks(), 0);
        drop(group);
        assert_eq!(ticks, 3);
        assert_eq!(pm.alpha(), 0.0);
        assert!((pm.status().sim_time_seconds - 0.1).abs() < 1e-12);
    }

    #[test]
    fn turn_based_reset_clears_queue() {
        let clock = ManualClock::new();
        let mut pm = TurnBasedPacemaker::new(rate(30), Arc::new(clock));
        pm.step_many(5);
        pm.reset();
        assert_eq!(pm.pending_ticks(), 0);
    }

    #[test]
    fn group_receives_fixed_delta() {
        let (mut pm, _clock) = continuous(40);
        let mut seen = Vec::new();
        let mut group = |dt: f64| seen.push(dt);
        pm.advance(0.05, TickTarget::direct(&mut group));
        drop(group);
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|dt| (dt - 0.025).abs() < 1e-15));
    }
}

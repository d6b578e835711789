//! Cooperative step executor: a resumable, budgeted walk over phases.
//!
//! One fixed tick of gameplay is a declared, total order of named
//! [`Phase`]s, each holding an ordered list of [`Unit`]s. The executor
//! walks that order inside a time budget and, when the budget runs out,
//! stops at a unit boundary and remembers exactly where it was. The next
//! call picks up at that same unit.
//!
//! Phase order is a correctness property of the gameplay being scheduled
//! (input before abilities before effects before events), so the executor
//! never reorders, skips, or parallelises anything.
//!
//! # Units
//!
//! Whether a unit can yield mid-way is decided once, when it is registered:
//!
//! - [`Unit::plain`] wraps a [`SimUnit`] that always runs to completion.
//! - [`Unit::sliced`] wraps a [`SlicedUnit`] that does part of its work per
//!   call and reports whether it finished. An unfinished sliced unit is
//!   resumed, not restarted, on the next executor call.
//!
//! # Budget
//!
//! The budget is checked only at unit boundaries (and inside sliced units,
//! which receive the remaining time). A single plain unit can therefore
//! overrun the budget; the budget is advisory, not hard real-time.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use cadence_types::StepOutcome;
use tracing::debug;

use crate::clock::Clock;

/// Smallest budget a step is ever given, so every call makes progress.
pub const MIN_STEP_BUDGET: Duration = Duration::from_millis(1);

/// A unit of simulation work that always runs to completion.
pub trait SimUnit {
    /// Apply one fixed tick's worth of this unit's work.
    fn update(&mut self, fixed_dt: f64);
}

/// A unit of simulation work that can be spread over several calls.
pub trait SlicedUnit {
    /// Do as much of this tick's work as fits in `remaining`.
    ///
    /// Returns `true` once the tick's work is finished. Returning `false`
    /// keeps the unit's internal progress; the next call continues it.
    fn update_slice(&mut self, fixed_dt: f64, remaining: Duration) -> bool;

    /// Drop any partial progress for the current tick.
    fn reset_slice(&mut self);
}

impl<T: SimUnit + ?Sized> SimUnit for Rc<RefCell<T>> {
    fn update(&mut self, fixed_dt: f64) {
        self.borrow_mut().update(fixed_dt);
    }
}

impl<T: SlicedUnit + ?Sized> SlicedUnit for Rc<RefCell<T>> {
    fn update_slice(&mut self, fixed_dt: f64, remaining: Duration) -> bool {
        self.borrow_mut().update_slice(fixed_dt, remaining)
    }

    fn reset_slice(&mut self) {
        self.borrow_mut().reset_slice();
    }
}

/// Adapter so closures can be registered as plain units.
struct FnUnit<F>(F);

impl<F: FnMut(f64)> SimUnit for FnUnit<F> {
    fn update(&mut self, fixed_dt: f64) {
        (self.0)(fixed_dt);
    }
}

/// How a unit is driven, fixed at registration time.
pub enum UnitKind {
    /// Runs to completion in a single call.
    Plain(Box<dyn SimUnit>),
    /// May yield and resume across calls.
    Sliced(Box<dyn SlicedUnit>),
}

/// A named unit of work inside a [`Phase`].
pub struct Unit {
    name: String,
    kind: UnitKind,
}

impl Unit {
    /// Register a unit that always runs to completion.
    pub fn plain(name: impl Into<String>, unit: impl SimUnit + 'static) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::Plain(Box::new(unit)),
        }
    }

    /// Register a unit that can be time-sliced.
    pub fn sliced(name: impl Into<String>, unit: impl SlicedUnit + 'static) -> Self {
        Self {
            name: name.into(),
            kind: UnitKind::Sliced(Box::new(unit)),
        }
    }

    /// Register a closure as a plain unit.
    pub fn from_fn(name: impl Into<String>, f: impl FnMut(f64) + 'static) -> Self {
        Self::plain(name, FnUnit(f))
    }

    /// The unit's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the unit was registered as time-sliced.
    pub const fn is_sliced(&self) -> bool {
        matches!(self.kind, UnitKind::Sliced(_))
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("name", &self.name)
            .field("sliced", &self.is_sliced())
            .finish()
    }
}

/// A named, ordered group of units.
#[derive(Debug)]
pub struct Phase {
    name: String,
    units: Vec<Unit>,
}

impl Phase {
    /// Create an empty phase.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
        }
    }

    /// Append a unit and return the phase (builder style).
    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.units.push(unit);
        self
    }

    /// Append a unit.
    pub fn push(&mut self, unit: Unit) {
        self.units.push(unit);
    }

    /// The phase's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of units in the phase.
    pub const fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the phase has no units.
    pub const fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Names of the units, in execution order.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(Unit::name)
    }
}

/// Where the executor will resume.
///
/// When `active` is false the cursor is always `(0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursor {
    phase_index: usize,
    unit_index: usize,
    active: bool,
}

impl Cursor {
    /// The idle cursor.
    pub const IDLE: Self = Self {
        phase_index: 0,
        unit_index: 0,
        active: false,
    };

    const START: Self = Self {
        phase_index: 0,
        unit_index: 0,
        active: true,
    };

    /// Index of the phase that runs next.
    pub const fn phase_index(&self) -> usize {
        self.phase_index
    }

    /// Index, within its phase, of the unit that runs next.
    pub const fn unit_index(&self) -> usize {
        self.unit_index
    }

    /// Whether a tick is in flight.
    pub const fn is_active(&self) -> bool {
        self.active
    }
}

/// Walks phases in order within a time budget, resumable at any unit.
pub struct CooperativeExecutor {
    phases: Vec<Phase>,
    cursor: Cursor,
    on_tick_complete: Option<Box<dyn FnMut(u64)>>,
    completed_ticks: u64,
}

impl CooperativeExecutor {
    /// Create an executor over `phases`, in the given order.
    pub fn new(phases: Vec<Phase>) -> Self {
        Self {
            phases,
            cursor: Cursor::IDLE,
            on_tick_complete: None,
            completed_ticks: 0,
        }
    }

    /// Register a callback run after the last unit of a tick completes.
    ///
    /// The callback receives the number of ticks this executor has
    /// completed, including the one that just finished.
    pub fn set_on_tick_complete(&mut self, callback: impl FnMut(u64) + 'static) {
        self.on_tick_complete = Some(Box::new(callback));
    }

    /// Run units from the cursor until the tick completes or `budget` is
    /// spent.
    ///
    /// Elapsed time is measured from entry and checked before every unit.
    /// A zero budget is raised to [`MIN_STEP_BUDGET`].
    pub fn step(&mut self, fixed_dt: f64, budget: Duration, clock: &dyn Clock) -> StepOutcome {
        let budget = budget.max(MIN_STEP_BUDGET);
        let start = clock.now();

        if !self.cursor.active {
            self.cursor = Cursor::START;
        }

        while let Some(phase) = self.phases.get_mut(self.cursor.phase_index) {
            while let Some(unit) = phase.units.get_mut(self.cursor.unit_index) {
                let elapsed = clock.now().saturating_sub(start);
                if elapsed >= budget {
                    debug!(
                        phase = phase.name.as_str(),
                        unit = unit.name.as_str(),
                        elapsed_us = elapsed.as_micros(),
                        "Budget spent before unit, suspending"
                    );
                    return StepOutcome::Incomplete;
                }

                match &mut unit.kind {
                    UnitKind::Plain(plain) => plain.update(fixed_dt),
                    UnitKind::Sliced(sliced) => {
                        let remaining = budget.saturating_sub(elapsed);
                        if !sliced.update_slice(fixed_dt, remaining) {
                            debug!(
                                phase = phase.name.as_str(),
                                unit = unit.name.as_str(),
                                "Sliced unit yielded, suspending"
                            );
                            return StepOutcome::Incomplete;
                        }
                    }
                }

                self.cursor.unit_index = self.cursor.unit_index.saturating_add(1);
            }

            self.cursor.phase_index = self.cursor.phase_index.saturating_add(1);
            self.cursor.unit_index = 0;
        }

        self.completed_ticks = self.completed_ticks.saturating_add(1);
        if let Some(callback) = self.on_tick_complete.as_mut() {
            callback(self.completed_ticks);
        }
        self.cursor = Cursor::IDLE;
        StepOutcome::Complete
    }

    /// Abandon the tick in flight.
    ///
    /// The cursor returns to idle and every sliced unit drops its partial
    /// progress, so the next [`step`](Self::step) starts the tick over.
    pub fn reset(&mut self) {
        debug!(
            phase_index = self.cursor.phase_index,
            unit_index = self.cursor.unit_index,
            "Resetting cooperative executor"
        );
        self.cursor = Cursor::IDLE;
        for phase in &mut self.phases {
            for unit in &mut phase.units {
                if let UnitKind::Sliced(sliced) = &mut unit.kind {
                    sliced.reset_slice();
                }
            }
        }
    }

    /// Current resume position.
    pub const fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Whether a tick is in flight.
    pub const fn is_active(&self) -> bool {
        self.cursor.active
    }

    /// Ticks completed since construction.
    pub const fn completed_ticks(&self) -> u64 {
        self.completed_ticks
    }

    /// Number of phases.
    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Phase names in execution order.
    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(Phase::name)
    }

    /// Look up a phase by name.
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|phase| phase.name == name)
    }
}

impl fmt::Debug for CooperativeExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CooperativeExecutor")
            .field("phases", &self.phases)
            .field("cursor", &self.cursor)
            .field("completed_ticks", &self.completed_ticks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::clock::ManualClock;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Plain unit that logs its name and spends a fixed amount of time.
    fn logging_unit(log: &Log, clock: &ManualClock, name: &str, cost_ms: u64) -> Unit {
        let log = Rc::clone(log);
        let clock = clock.clone();
        let label = name.to_owned();
        Unit::from_fn(name, move |_dt| {
            log.borrow_mut().push(label.clone());
            clock.advance_ms(cost_ms);
        })
    }

    /// Sliced unit that needs `parts` slices to finish a tick.
    struct Chunked {
        parts: u32,
        done: u32,
        finished_ticks: u32,
        resets: u32,
    }

    impl SlicedUnit for Chunked {
        fn update_slice(&mut self, _fixed_dt: f64, _remaining: Duration) -> bool {
            self.done += 1;
            if self.done >= self.parts {
                self.done = 0;
                self.finished_ticks += 1;
                return true;
            }
            false
        }

        fn reset_slice(&mut self) {
            self.done = 0;
            self.resets += 1;
        }
    }

    fn chunked(parts: u32) -> Rc<RefCell<Chunked>> {
        Rc::new(RefCell::new(Chunked {
            parts,
            done: 0,
            finished_ticks: 0,
            resets: 0,
        }))
    }

    #[test]
    fn runs_phases_and_units_in_declared_order() {
        let clock = ManualClock::new();
        let log: Log = Rc::default();
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("input")
                .with_unit(logging_unit(&log, &clock, "a", 0))
                .with_unit(logging_unit(&log, &clock, "b", 0)),
            Phase::new("abilities").with_unit(logging_unit(&log, &clock, "c", 0)),
        ]);

        let outcome = exec.step(0.02, Duration::from_millis(5), &clock);
        assert_eq!(outcome, StepOutcome::Complete);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        assert_eq!(exec.cursor(), Cursor::IDLE);
        assert_eq!(exec.completed_ticks(), 1);
    }

    #[test]
    fn suspends_at_unit_boundary_and_resumes_there() {
        let clock = ManualClock::new();
        let log: Log = Rc::default();
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("one")
                .with_unit(logging_unit(&log, &clock, "a", 3))
                .with_unit(logging_unit(&log, &clock, "b", 3)),
            Phase::new("two").with_unit(logging_unit(&log, &clock, "c", 3)),
        ]);

        // "a" spends 3ms of a 4ms budget, "b" still starts (3 < 4) and
        // pushes elapsed to 6ms, so the check before "c" fails.
        let outcome = exec.step(0.02, Duration::from_millis(4), &clock);
        assert_eq!(outcome, StepOutcome::Incomplete);
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        let cursor = exec.cursor();
        assert!(cursor.is_active());
        assert_eq!((cursor.phase_index(), cursor.unit_index()), (1, 0));

        let outcome = exec.step(0.02, Duration::from_millis(4), &clock);
        assert_eq!(outcome, StepOutcome::Complete);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn sliced_unit_is_resumed_not_restarted() {
        let clock = ManualClock::new();
        let log: Log = Rc::default();
        let slicer = chunked(3);
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("before").with_unit(logging_unit(&log, &clock, "pre", 0)),
            Phase::new("heavy").with_unit(Unit::sliced("chunked", Rc::clone(&slicer))),
            Phase::new("after").with_unit(logging_unit(&log, &clock, "post", 0)),
        ]);
        let budget = Duration::from_millis(10);

        assert_eq!(exec.step(0.02, budget, &clock), StepOutcome::Incomplete);
        assert_eq!(exec.cursor().phase_index(), 1);
        assert_eq!(exec.step(0.02, budget, &clock), StepOutcome::Incomplete);
        assert_eq!(exec.step(0.02, budget, &clock), StepOutcome::Complete);

        // "pre" ran once: resuming did not restart the tick.
        assert_eq!(*log.borrow(), vec!["pre", "post"]);
        assert_eq!(slicer.borrow().finished_ticks, 1);
    }

    #[test]
    fn sliced_unit_receives_remaining_budget() {
        struct BudgetSpy {
            seen: Rc<Cell<Duration>>,
        }
        impl SlicedUnit for BudgetSpy {
            fn update_slice(&mut self, _dt: f64, remaining: Duration) -> bool {
                self.seen.set(remaining);
                true
            }
            fn reset_slice(&mut self) {}
        }

        let clock = ManualClock::new();
        let log: Log = Rc::default();
        let seen = Rc::new(Cell::new(Duration::ZERO));
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("p")
                .with_unit(logging_unit(&log, &clock, "a", 2))
                .with_unit(Unit::sliced(
                    "spy",
                    BudgetSpy {
                        seen: Rc::clone(&seen),
                    },
                )),
        ]);
        exec.step(0.02, Duration::from_millis(5), &clock);
        assert_eq!(seen.get(), Duration::from_millis(3));
    }

    #[test]
    fn reset_discards_progress_and_resets_slices() {
        let clock = ManualClock::new();
        let slicer = chunked(4);
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("heavy").with_unit(Unit::sliced("chunked", Rc::clone(&slicer))),
        ]);
        exec.step(0.02, Duration::from_millis(1), &clock);
        exec.step(0.02, Duration::from_millis(1), &clock);
        assert_eq!(slicer.borrow().done, 2);

        exec.reset();
        assert_eq!(exec.cursor(), Cursor::IDLE);
        assert_eq!(slicer.borrow().done, 0);
        assert_eq!(slicer.borrow().resets, 1);
    }

    #[test]
    fn tick_complete_callback_sees_running_count() {
        let clock = ManualClock::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut exec = CooperativeExecutor::new(vec![Phase::new("empty")]);
        let sink = Rc::clone(&seen);
        exec.set_on_tick_complete(move |n| sink.borrow_mut().push(n));
        for _ in 0..3 {
            assert!(exec.step(0.02, Duration::ZERO, &clock).is_complete());
        }
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn zero_budget_still_makes_progress() {
        let clock = ManualClock::new();
        let log: Log = Rc::default();
        let mut exec = CooperativeExecutor::new(vec![
            Phase::new("p").with_unit(logging_unit(&log, &clock, "a", 0)),
        ]);
        assert!(exec.step(0.02, Duration::ZERO, &clock).is_complete());
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn introspection_reports_names() {
        let exec = CooperativeExecutor::new(vec![
            Phase::new("input").with_unit(Unit::from_fn("keys", |_| {})),
            Phase::new("events"),
        ]);
        assert_eq!(exec.phase_count(), 2);
        assert_eq!(exec.phase_names().collect::<Vec<_>>(), vec!["input", "events"]);
        let input = exec.phase("input").unwrap();
        assert_eq!(input.unit_names().collect::<Vec<_>>(), vec!["keys"]);
        assert!(exec.phase("missing").is_none());
    }
}

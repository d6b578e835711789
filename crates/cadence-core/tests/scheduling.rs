//! End-to-end tests for the fixed-step scheduler.
//!
//! Everything here goes through the public API only. Time is injected with
//! a shared [`ManualClock`]; units that "cost" time advance that clock
//! themselves, so budget behaviour is exact and repeatable.

// Integration tests use unwrap extensively for clarity -- panicking on
// failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::clock::ManualClock;
use cadence_core::controller::LoopController;
use cadence_core::executor::{CooperativeExecutor, Phase, SimUnit, SlicedUnit, Unit};
use cadence_core::notify::RecordingSink;
use cadence_core::pacemaker::{Budget, ContinuousPacemaker, Pacemaker, TickTarget};
use cadence_core::policy::RatePolicy;
use cadence_core::rate::{FixedRate, RateDistributor, RateError};
use cadence_core::run::{QuiescenceProbe, RunController};
use cadence_core::substep::{SubSimulation, SubStepper};
use cadence_types::{CompletionReason, LoopMode, StepOutcome};

// =============================================================================
// Helpers
// =============================================================================

/// Deterministic pseudo-random frame times in whole milliseconds (1..=37).
fn frame_times_ms(count: usize) -> Vec<u64> {
    let mut state: u64 = 0x2545_F491_4F6C_DD1D;
    (0..count)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state % 37 + 1
        })
        .collect()
}

/// Plain unit that logs its name and costs a fixed amount of clock time.
struct Costly {
    name: &'static str,
    cost: Duration,
    clock: ManualClock,
    trace: Rc<RefCell<Vec<String>>>,
}

impl SimUnit for Costly {
    fn update(&mut self, _fixed_dt: f64) {
        self.clock.advance(self.cost);
        self.trace.borrow_mut().push(self.name.to_owned());
    }
}

/// Sliced unit working through a list of items at 1 ms per item.
struct Sweep {
    name: &'static str,
    items: u32,
    next: u32,
    clock: ManualClock,
    trace: Rc<RefCell<Vec<String>>>,
}

impl SlicedUnit for Sweep {
    fn update_slice(&mut self, _fixed_dt: f64, remaining: Duration) -> bool {
        let mut spent = Duration::ZERO;
        // Every call finishes at least one item.
        while self.next < self.items {
            self.clock.advance_ms(1);
            spent += Duration::from_millis(1);
            self.trace
                .borrow_mut()
                .push(format!("{}[{}]", self.name, self.next));
            self.next += 1;
            if self.next < self.items && spent >= remaining {
                return false;
            }
        }
        self.next = 0;
        true
    }

    fn reset_slice(&mut self) {
        self.next = 0;
    }
}

/// Build the input -> abilities -> effects -> events pipeline.
fn pipeline(clock: &ManualClock, trace: &Rc<RefCell<Vec<String>>>) -> CooperativeExecutor {
    let costly = |name, ms| Costly {
        name,
        cost: Duration::from_millis(ms),
        clock: clock.clone(),
        trace: Rc::clone(trace),
    };
    let sweep = |name, items| Sweep {
        name,
        items,
        next: 0,
        clock: clock.clone(),
        trace: Rc::clone(trace),
    };
    CooperativeExecutor::new(vec![
        Phase::new("input").with_unit(Unit::plain("input", costly("input", 1))),
        Phase::new("abilities")
            .with_unit(Unit::sliced("activate", sweep("activate", 7)))
            .with_unit(Unit::plain("cooldowns", costly("cooldowns", 2))),
        Phase::new("effects").with_unit(Unit::sliced("resolve", sweep("resolve", 5))),
        Phase::new("events").with_unit(Unit::plain("dispatch", costly("dispatch", 3))),
    ])
}

/// Toy physics world that stops moving after a number of steps.
#[derive(Debug, Default)]
struct Bodies {
    steps: u64,
    sleep_after: Option<u64>,
}

impl QuiescenceProbe for Bodies {
    fn is_active(&self) -> bool {
        self.sleep_after.is_none_or(|n| self.steps < n)
    }
}

impl SubSimulation for Bodies {
    fn step(&mut self, _sub_dt: f64) {
        self.steps += 1;
    }
}

fn sub_stepper(fixed: FixedRate, sleep_after: Option<u64>) -> (SubStepper<Bodies>, RecordingSink) {
    let policy = Arc::new(RatePolicy::with_settings(fixed, 0, 4).unwrap());
    let sink = RecordingSink::new();
    let run = RunController::new(policy, fixed.hz(), Box::new(sink.clone())).unwrap();
    let world = Bodies {
        steps: 0,
        sleep_after,
    };
    (SubStepper::new(world, run), sink)
}

// =============================================================================
// Time conservation
// =============================================================================

#[test]
fn continuous_ticks_track_accumulated_time() {
    let clock = ManualClock::new();
    let fixed = FixedRate::from_hz(50).unwrap();
    let mut pacemaker = ContinuousPacemaker::new(fixed, Arc::new(clock));

    let mut ticks = 0_u64;
    let mut group = |_dt: f64| ticks += 1;
    let mut total_ms = 0_u64;
    for ms in frame_times_ms(2_000) {
        total_ms += ms;
        pacemaker.advance(ms as f64 / 1000.0, TickTarget::direct(&mut group));
        assert_eq!(pacemaker.total_ticks(), total_ms / 20, "after {total_ms} ms");
    }
    drop(group);
    assert_eq!(ticks, total_ms / 20);
}

#[test]
fn sixtieths_of_a_second_never_lose_a_tick() {
    let clock = ManualClock::new();
    let fixed = FixedRate::from_hz(60).unwrap();
    let mut pacemaker = ContinuousPacemaker::new(fixed, Arc::new(clock));
    let mut group = |_dt: f64| {};
    for frame in 1..=3_600_u64 {
        pacemaker.advance(fixed.delta_seconds(), TickTarget::direct(&mut group));
        assert_eq!(pacemaker.total_ticks(), frame);
    }
}

// =============================================================================
// Rate distribution
// =============================================================================

#[test]
fn distributor_is_exact_over_one_second() {
    let cases = [(24, 60), (37, 60), (50, 60), (60, 60), (120, 50), (144, 60), (1, 30)];
    for (target, fixed_hz) in cases {
        let fixed = FixedRate::from_hz(fixed_hz).unwrap();
        let mut distributor = RateDistributor::new(target, fixed, 4).unwrap();
        let floor = target / fixed_hz;
        let ceil = target.div_ceil(fixed_hz);

        let mut total = 0_u32;
        for _ in 0..fixed_hz {
            let steps = distributor.next_steps();
            assert!(steps == floor || steps == ceil, "{target}/{fixed_hz}: {steps}");
            total += steps;
        }
        assert_eq!(total, target, "{target}/{fixed_hz}");
        assert_eq!(distributor.remainder(), 0);
    }
}

#[test]
fn twenty_four_hz_inside_sixty_hz() {
    let fixed = FixedRate::from_hz(60).unwrap();
    let mut distributor = RateDistributor::new(24, fixed, 1).unwrap();
    let steps: Vec<u32> = (0..5).map(|_| distributor.next_steps()).collect();
    assert_eq!(steps, vec![0, 0, 1, 0, 1]);
    assert_eq!(steps.iter().sum::<u32>(), 2);
}

#[test]
fn fixed_delta_must_be_whole_hz() {
    assert!(matches!(
        FixedRate::from_delta(0.017),
        Err(RateError::NonIntegerHz { nearest_hz: 59, .. })
    ));
    assert_eq!(FixedRate::from_delta(1.0 / 60.0).unwrap().hz(), 60);
    assert_eq!(FixedRate::from_delta(0.02).unwrap().hz(), 50);
}

// =============================================================================
// Cooperative execution
// =============================================================================

#[test]
fn resumed_execution_matches_single_call() {
    let reference_clock = ManualClock::new();
    let reference_trace = Rc::new(RefCell::new(Vec::new()));
    let mut reference = pipeline(&reference_clock, &reference_trace);
    assert_eq!(
        reference.step(0.02, Duration::from_secs(10), &reference_clock),
        StepOutcome::Complete
    );

    let clock = ManualClock::new();
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut sliced = pipeline(&clock, &trace);
    let mut calls = 1;
    while sliced.step(0.02, Duration::from_millis(4), &clock) == StepOutcome::Incomplete {
        calls += 1;
        assert!(calls < 100, "executor never finished");
    }

    assert!(calls > 1, "budget never forced a suspension");
    assert_eq!(*trace.borrow(), *reference_trace.borrow());
    assert_eq!(sliced.completed_ticks(), 1);
    assert!(!sliced.is_active());
}

#[test]
fn cooperative_pacemaker_spreads_a_tick_over_frames() {
    let clock = ManualClock::new();
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut executor = pipeline(&clock, &trace);
    let fixed = FixedRate::from_hz(50).unwrap();
    let mut pacemaker = ContinuousPacemaker::new(fixed, Arc::new(clock.clone()));
    let budget = Budget::new(4, 16);

    let first = pacemaker.advance(0.02, TickTarget::cooperative(&mut executor, budget));
    assert!(first.suspended);
    assert_eq!(first.ticks_completed, 0);

    let mut completed = 0;
    for _ in 0..20 {
        let report = pacemaker.advance(0.0, TickTarget::cooperative(&mut executor, budget));
        completed += report.ticks_completed;
        if completed > 0 {
            break;
        }
    }
    assert_eq!(completed, 1);
    assert_eq!(pacemaker.total_ticks(), 1);
    assert!(!pacemaker.is_fused());
}

#[test]
fn fuse_trips_on_slice_limit_and_holds_until_reset() {
    let clock = ManualClock::new();
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut executor = pipeline(&clock, &trace);
    let fixed = FixedRate::from_hz(50).unwrap();
    let mut pacemaker = ContinuousPacemaker::new(fixed, Arc::new(clock.clone()));
    let budget = Budget::new(1, 3);

    let first = pacemaker.advance(0.02, TickTarget::cooperative(&mut executor, budget));
    let second = pacemaker.advance(0.0, TickTarget::cooperative(&mut executor, budget));
    assert!(first.suspended && !first.fused);
    assert!(second.suspended && !second.fused);

    let third = pacemaker.advance(0.0, TickTarget::cooperative(&mut executor, budget));
    assert!(third.fused);
    assert!(pacemaker.is_fused());
    assert!(!executor.is_active(), "fuse discards partial progress");

    let before = trace.borrow().len();
    let halted = pacemaker.advance(1.0, TickTarget::cooperative(&mut executor, budget));
    assert!(halted.fused);
    assert_eq!(halted.ticks_completed, 0);
    assert_eq!(trace.borrow().len(), before);

    pacemaker.reset();
    assert!(!pacemaker.is_fused());
    let generous = Budget::new(1_000, 3);
    let report = pacemaker.advance(0.02, TickTarget::cooperative(&mut executor, generous));
    assert_eq!(report.ticks_completed, 1);
}

// =============================================================================
// Loop control
// =============================================================================

#[test]
fn pause_and_step_through_loop_controller() {
    let clock = ManualClock::new();
    let fixed = FixedRate::from_hz(50).unwrap();
    let mut controller = LoopController::new(fixed, Arc::new(clock));
    let mut ticks = 0_u64;
    let mut group = |_dt: f64| ticks += 1;

    controller.frame(0.1, TickTarget::direct(&mut group));
    controller.pause();
    controller.frame(5.0, TickTarget::direct(&mut group));
    controller.advance_ticks(3);
    controller.frame(0.0, TickTarget::direct(&mut group));
    assert_eq!(controller.mode(), LoopMode::TurnBased);
    controller.resume();
    controller.frame(0.02, TickTarget::direct(&mut group));
    drop(group);

    assert_eq!(ticks, 5 + 3 + 1);
    assert_eq!(controller.total_ticks(), 9);
    assert_eq!(controller.status().total_ticks, 9);
}

#[test]
fn pausing_with_a_tick_in_flight_conserves_time() {
    let clock = ManualClock::new();
    let trace = Rc::new(RefCell::new(Vec::new()));
    let unit = |name: &'static str, cost_ms: u64| {
        Unit::plain(
            name,
            Costly {
                name,
                cost: Duration::from_millis(cost_ms),
                clock: clock.clone(),
                trace: Rc::clone(&trace),
            },
        )
    };
    // 5 ms of work against a 4 ms budget: every tick spans two frames.
    let mut executor = CooperativeExecutor::new(vec![
        Phase::new("work")
            .with_unit(unit("heavy", 5))
            .with_unit(unit("light", 0)),
    ]);
    let fixed = FixedRate::from_hz(50).unwrap();
    let mut controller = LoopController::new(fixed, Arc::new(clock.clone()));
    let budget = Budget::new(4, 4);
    let frames = frame_times_ms(400);
    let mut continuous_ms = 0_u64;

    for &ms in &frames[..150] {
        controller.frame(ms as f64 / 1000.0, TickTarget::cooperative(&mut executor, budget));
        continuous_ms += ms;
    }
    while controller.in_flight_owner().is_none() {
        controller.frame(0.02, TickTarget::cooperative(&mut executor, budget));
        continuous_ms += 20;
    }
    assert_eq!(controller.in_flight_owner(), Some(LoopMode::Continuous));

    // Paused: wall time is not counted, three explicit steps are queued.
    controller.pause();
    controller.advance_ticks(3);
    controller.frame(0.03, TickTarget::cooperative(&mut executor, budget));
    assert_eq!(controller.in_flight_owner(), None);
    controller.frame(0.03, TickTarget::cooperative(&mut executor, budget));
    assert_eq!(controller.in_flight_owner(), Some(LoopMode::TurnBased));

    controller.resume();
    for &ms in &frames[150..] {
        controller.frame(ms as f64 / 1000.0, TickTarget::cooperative(&mut executor, budget));
        continuous_ms += ms;
    }

    // Drain the real-time backlog, then the queued steps.
    for _ in 0..10_000 {
        if !executor.is_active() && controller.continuous().accumulator_seconds() < 0.02 - 1e-9 {
            break;
        }
        controller.frame(0.0, TickTarget::cooperative(&mut executor, budget));
    }
    controller.pause();
    for _ in 0..10 {
        controller.frame(0.0, TickTarget::cooperative(&mut executor, budget));
    }

    assert!(!controller.is_fused());
    assert!(!executor.is_active());
    assert_eq!(controller.turn_based().pending_ticks(), 0);
    assert_eq!(controller.continuous().total_ticks(), continuous_ms / 20);
    assert_eq!(controller.turn_based().total_ticks(), 3);
    assert_eq!(controller.total_ticks(), continuous_ms / 20 + 3);
    assert_eq!(executor.completed_ticks(), controller.total_ticks());
    let light_runs = trace.borrow().iter().filter(|name| *name == "light").count();
    assert_eq!(light_runs as u64, controller.total_ticks());
}

// =============================================================================
// Sub-simulation runs
// =============================================================================

#[test]
fn run_for_ticks_inside_fixed_loop() {
    let clock = ManualClock::new();
    let fixed = FixedRate::from_hz(50).unwrap();
    let (sub, sink) = sub_stepper(fixed, None);
    let sub = Rc::new(RefCell::new(sub));
    sub.borrow_mut().run_mut().run_for_fixed_ticks(10).unwrap();

    let mut executor = CooperativeExecutor::new(vec![
        Phase::new("physics").with_unit(Unit::plain("bodies", Rc::clone(&sub))),
    ]);
    let mut pacemaker = ContinuousPacemaker::new(fixed, Arc::new(clock));
    let budget = Budget::new(4, 8);

    for frame in 1..=20 {
        pacemaker.advance(0.02, TickTarget::cooperative(&mut executor, budget));
        let expected = if frame < 10 { 0 } else { 1 };
        assert_eq!(sink.completions().len(), expected, "frame {frame}");
    }
    assert_eq!(sink.completions(), vec![(CompletionReason::TicksReached, 10)]);
    assert_eq!(sub.borrow().world().steps, 10);
    assert!(!sub.borrow().run().policy().is_enabled());
}

#[test]
fn run_until_sleeping_completes_on_quiescence() {
    let fixed = FixedRate::from_hz(60).unwrap();
    let (mut sub, sink) = sub_stepper(fixed, Some(42));
    sub.run_mut().run_until_sleeping(10_000).unwrap();

    let mut ticks = 0_u32;
    while sub.run().is_running() {
        sub.tick();
        ticks += 1;
        assert!(ticks < 1_000);
    }
    assert_eq!(sink.completions(), vec![(CompletionReason::Quiescent, 42)]);
    assert_eq!(sub.world().steps, 42);
}

//! Drives a sub-simulation at its own rate inside the fixed tick.
//!
//! [`SubStepper`] is the consumer side of the [`RatePolicy`]: once per fixed
//! tick it checks the policy version, rebuilds its [`RateDistributor`] if
//! the settings moved, and steps the sub-simulation as many times as the
//! distributor says. Each completed sub-step is reported to the owned
//! [`RunController`], so bounded runs count sub-ticks, not outer ticks.
//!
//! A rebuild starts the new distributor with an empty carry; any fractional
//! sub-step owed under the old rate is dropped.

use std::sync::Arc;

use tracing::{debug, error};

use crate::executor::SimUnit;
use crate::policy::RatePolicy;
use crate::rate::RateDistributor;
use crate::run::{QuiescenceProbe, RunController};

/// A world stepped at its own rate, e.g. physics.
pub trait SubSimulation: QuiescenceProbe {
    /// Advance the world by one sub-step of `sub_dt` seconds.
    fn step(&mut self, sub_dt: f64);
}

/// Steps a [`SubSimulation`] according to a shared [`RatePolicy`].
#[derive(Debug)]
pub struct SubStepper<S> {
    policy: Arc<RatePolicy>,
    cached_version: Option<u64>,
    distributor: Option<RateDistributor>,
    world: S,
    run: RunController,
    sub_ticks: u64,
    last_steps: u32,
}

impl<S: SubSimulation> SubStepper<S> {
    /// Create a stepper for `world`, reading the policy `run` writes to.
    pub fn new(world: S, run: RunController) -> Self {
        Self {
            policy: Arc::clone(run.policy()),
            cached_version: None,
            distributor: None,
            world,
            run,
            sub_ticks: 0,
            last_steps: 0,
        }
    }

    /// Run this fixed tick's sub-steps and return how many ran.
    ///
    /// Stops early if a bounded run completes part-way through the tick.
    pub fn tick(&mut self) -> u32 {
        self.refresh_distributor();
        let Some(distributor) = self.distributor.as_mut() else {
            self.last_steps = 0;
            return 0;
        };
        let planned = distributor.next_steps();
        let sub_dt = distributor.sub_step_seconds();

        let mut ran = 0_u32;
        while ran < planned {
            self.world.step(sub_dt);
            ran = ran.saturating_add(1);
            self.sub_ticks = self.sub_ticks.saturating_add(1);
            if self.run.after_fixed_tick(&self.world).is_some() {
                break;
            }
        }
        self.last_steps = ran;
        ran
    }

    fn refresh_distributor(&mut self) {
        let settings = self.policy.settings();
        if self.cached_version == Some(settings.version) {
            return;
        }
        self.cached_version = Some(settings.version);
        match RateDistributor::new(
            settings.target_hz,
            self.policy.fixed_rate(),
            settings.max_sub_steps,
        ) {
            Ok(distributor) => {
                debug!(
                    version = settings.version,
                    target_hz = settings.target_hz,
                    max_sub_steps = settings.max_sub_steps,
                    "Rate distributor rebuilt"
                );
                self.distributor = Some(distributor);
            }
            Err(err) => {
                error!(
                    version = settings.version,
                    error = %err,
                    "Rate policy settings rejected, sub-simulation halted"
                );
                self.distributor = None;
            }
        }
    }

    /// Sub-simulation interpolation factor, separate from the outer alpha.
    pub fn alpha(&self) -> f64 {
        self.distributor.as_ref().map_or(0.0, RateDistributor::alpha)
    }

    /// Sub-steps run during the most recent tick.
    pub const fn last_steps(&self) -> u32 {
        self.last_steps
    }

    /// Sub-steps run since construction.
    pub const fn sub_ticks(&self) -> u64 {
        self.sub_ticks
    }

    /// The stepped world.
    pub const fn world(&self) -> &S {
        &self.world
    }

    /// The stepped world, mutably.
    pub const fn world_mut(&mut self) -> &mut S {
        &mut self.world
    }

    /// The run controller.
    pub const fn run(&self) -> &RunController {
        &self.run
    }

    /// The run controller, mutably (enable, disable, start runs).
    pub const fn run_mut(&mut self) -> &mut RunController {
        &mut self.run
    }
}

impl<S: SubSimulation> SimUnit for SubStepper<S> {
    fn update(&mut self, _fixed_dt: f64) {
        self.tick();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::arithmetic_side_effects)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use cadence_types::CompletionReason;

    use super::*;
    use crate::clock::ManualClock;
    use crate::executor::{CooperativeExecutor, Phase, Unit};
    use crate::notify::RecordingSink;
    use crate::rate::FixedRate;

    /// Counts steps and goes to sleep after a fixed number of them.
    #[derive(Debug, Default)]
    struct Bodies {
        steps: u64,
        sleep_after: Option<u64>,
        last_dt: f64,
    }

    impl QuiescenceProbe for Bodies {
        fn is_active(&self) -> bool {
            self.sleep_after.is_none_or(|n| self.steps < n)
        }
    }

    impl SubSimulation for Bodies {
        fn step(&mut self, sub_dt: f64) {
            self.steps += 1;
            self.last_dt = sub_dt;
        }
    }

    fn stepper(fixed_hz: u32, max_sub_steps: u32) -> (SubStepper<Bodies>, RecordingSink) {
        let fixed = FixedRate::from_hz(fixed_hz).unwrap();
        let policy = Arc::new(RatePolicy::with_settings(fixed, 0, max_sub_steps).unwrap());
        let sink = RecordingSink::new();
        let run = RunController::new(policy, 50, Box::new(sink.clone())).unwrap();
        (SubStepper::new(Bodies::default(), run), sink)
    }

    #[test]
    fn disabled_policy_runs_nothing() {
        let (mut sub, _) = stepper(60, 4);
        assert_eq!(sub.tick(), 0);
        assert_eq!(sub.world().steps, 0);
        assert_eq!(sub.alpha(), 0.0);
    }

    #[test]
    fn follows_distributor_sequence() {
        let (mut sub, _) = stepper(60, 4);
        sub.run_mut().enable(Some(24)).unwrap();
        let counts: Vec<u32> = (0..5).map(|_| sub.tick()).collect();
        assert_eq!(counts, vec![0, 0, 1, 0, 1]);
        assert_eq!(sub.sub_ticks(), 2);
        assert!((sub.world().last_dt - 1.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn rate_change_discards_carry() {
        let (mut sub, _) = stepper(60, 4);
        sub.run_mut().enable(Some(24)).unwrap();
        sub.tick();
        sub.tick();
        assert!(sub.alpha() > 0.0);

        sub.run_mut().enable(Some(30)).unwrap();
        // Fresh carry: 30/60 gives 0 then 1.
        assert_eq!(sub.tick(), 0);
        assert_eq!(sub.tick(), 1);
        assert_eq!(sub.alpha(), 0.0);
    }

    #[test]
    fn run_completion_stops_mid_tick() {
        let (mut sub, sink) = stepper(50, 4);
        sub.run_mut().enable(Some(120)).unwrap();
        sub.run_mut().run_for_fixed_ticks(3).unwrap();

        assert_eq!(sub.tick(), 2);
        assert_eq!(sub.tick(), 1);
        assert_eq!(sub.world().steps, 3);
        assert_eq!(
            sink.completions(),
            vec![(CompletionReason::TicksReached, 3)]
        );

        // Completion zeroed the rate; the next tick rebuilds at 0 Hz.
        assert_eq!(sub.tick(), 0);
        assert_eq!(sub.world().steps, 3);
    }

    #[test]
    fn run_until_sleeping_reports_quiescence() {
        let (mut sub, sink) = stepper(50, 4);
        sub.world_mut().sleep_after = Some(42);
        sub.run_mut().run_until_sleeping(10_000).unwrap();

        for _ in 0..100 {
            sub.tick();
        }
        assert_eq!(sub.world().steps, 42);
        assert_eq!(sink.completions(), vec![(CompletionReason::Quiescent, 42)]);
    }

    #[test]
    fn registers_as_executor_unit() {
        let (sub, _) = stepper(50, 4);
        let sub = Rc::new(RefCell::new(sub));
        sub.borrow_mut().run_mut().enable(Some(100)).unwrap();

        let mut executor = CooperativeExecutor::new(vec![
            Phase::new("physics").with_unit(Unit::plain("bodies", Rc::clone(&sub))),
        ]);
        let clock = ManualClock::new();
        for _ in 0..3 {
            executor.step(0.02, Duration::from_millis(4), &clock);
        }
        assert_eq!(sub.borrow().world().steps, 6);
        assert_eq!(sub.borrow().last_steps(), 2);
    }
}

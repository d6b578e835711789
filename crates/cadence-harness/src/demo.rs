//! Toy gameplay and physics used to exercise the scheduler.
//!
//! The pipeline mirrors a typical gameplay tick:
//!
//! 1. **input** -- sample a few random ability commands
//! 2. **abilities** -- sweep every agent, tick cooldowns, activate commands
//!    (time-sliced: the sweep yields when the frame budget runs out)
//! 3. **effects** -- turn activations into impulses on physics bodies
//! 4. **physics** -- the [`SubStepper`] running [`BodyWorld`] at its own rate
//! 5. **events** -- drain and count gameplay events
//!
//! Gameplay state shared between phases lives in an [`Arena`] behind
//! `Rc<RefCell<_>>`; everything runs on one thread.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use cadence_core::executor::{CooperativeExecutor, Phase, SimUnit, SlicedUnit, Unit};
use cadence_core::run::QuiescenceProbe;
use cadence_core::substep::{SubSimulation, SubStepper};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

/// Seconds an agent waits between ability activations.
const ABILITY_COOLDOWN_SECONDS: f64 = 1.5;

/// Agents swept between budget checks in the ability phase.
const SWEEP_CHUNK: usize = 64;

/// Downward acceleration in the physics world, m/s^2.
const GRAVITY: f64 = -9.81;

/// Fraction of speed kept after bouncing off the floor.
const RESTITUTION: f64 = 0.5;

/// Speed below which a grounded body falls asleep.
const SLEEP_SPEED: f64 = 0.05;

/// Upward speed an ability effect gives a body.
const LAUNCH_SPEED: f64 = 4.0;

// =============================================================================
// Gameplay state
// =============================================================================

/// Gameplay state shared by the non-physics phases.
#[derive(Debug, Default)]
pub struct Arena {
    /// Remaining cooldown per agent, in seconds.
    cooldowns: Vec<f64>,
    /// Agents that asked to activate this tick.
    commands: Vec<usize>,
    /// Agents whose ability fired this tick.
    activations: Vec<usize>,
    /// Events waiting for dispatch.
    events: Vec<GameEvent>,
    /// Running totals for the summary.
    totals: ArenaTotals,
}

/// Gameplay counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ArenaTotals {
    /// Ability commands sampled.
    pub commands: u64,
    /// Commands that actually fired.
    pub activations: u64,
    /// Events dispatched.
    pub events: u64,
}

/// Something the event phase dispatches.
#[derive(Debug, Clone, Copy)]
enum GameEvent {
    /// An agent's ability fired and launched its body.
    Launched { agent: usize },
}

impl Arena {
    /// Create an arena with `agents` agents, all off cooldown.
    pub fn new(agents: usize) -> Self {
        Self {
            cooldowns: vec![0.0; agents],
            ..Self::default()
        }
    }

    /// Counters so far.
    pub const fn totals(&self) -> ArenaTotals {
        self.totals
    }
}

/// Shared handle to the arena.
pub type SharedArena = Rc<RefCell<Arena>>;

// =============================================================================
// Physics sub-simulation
// =============================================================================

/// One body bouncing on a floor at height 0.
#[derive(Debug, Clone, Copy)]
struct Body {
    height: f64,
    velocity: f64,
    asleep: bool,
}

/// A column of bouncing bodies that eventually come to rest.
#[derive(Debug)]
pub struct BodyWorld {
    bodies: Vec<Body>,
    steps: u64,
}

impl BodyWorld {
    /// Drop `count` bodies from random heights between 1 and 10 metres.
    pub fn new(count: usize, rng: &mut impl Rng) -> Self {
        let bodies = (0..count)
            .map(|_| Body {
                height: rng.random_range(1.0..10.0),
                velocity: 0.0,
                asleep: false,
            })
            .collect();
        Self { bodies, steps: 0 }
    }

    /// Wake a body and launch it upwards.
    pub fn launch(&mut self, index: usize) {
        if let Some(body) = self.bodies.get_mut(index) {
            body.velocity += LAUNCH_SPEED;
            body.asleep = false;
        }
    }

    /// Bodies that are still moving.
    pub fn awake(&self) -> usize {
        self.bodies.iter().filter(|b| !b.asleep).count()
    }

    /// Number of bodies.
    pub const fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Sub-steps taken so far.
    pub const fn steps(&self) -> u64 {
        self.steps
    }
}

impl QuiescenceProbe for BodyWorld {
    fn is_active(&self) -> bool {
        self.bodies.iter().any(|b| !b.asleep)
    }
}

impl SubSimulation for BodyWorld {
    fn step(&mut self, sub_dt: f64) {
        for body in self.bodies.iter_mut().filter(|b| !b.asleep) {
            body.velocity += GRAVITY * sub_dt;
            body.height += body.velocity * sub_dt;
            if body.height <= 0.0 {
                body.height = 0.0;
                body.velocity = -body.velocity * RESTITUTION;
                if body.velocity.abs() < SLEEP_SPEED {
                    body.velocity = 0.0;
                    body.asleep = true;
                }
            }
        }
        self.steps = self.steps.saturating_add(1);
    }
}

/// The physics stepper shared between the executor and the harness.
pub type SharedPhysics = Rc<RefCell<SubStepper<BodyWorld>>>;

// =============================================================================
// Units
// =============================================================================

/// Samples a few random ability commands per tick.
struct InputSampler {
    arena: SharedArena,
    rng: SmallRng,
}

impl SimUnit for InputSampler {
    fn update(&mut self, _fixed_dt: f64) {
        let mut arena = self.arena.borrow_mut();
        let agents = arena.cooldowns.len();
        if agents == 0 {
            return;
        }
        let count = self.rng.random_range(0..=3_u64);
        for _ in 0..count {
            let agent = self.rng.random_range(0..agents);
            arena.commands.push(agent);
        }
        arena.totals.commands = arena.totals.commands.saturating_add(count);
    }
}

/// Ticks every agent's cooldown and fires queued commands, in slices.
struct AbilitySweep {
    arena: SharedArena,
    cursor: usize,
}

impl SlicedUnit for AbilitySweep {
    fn update_slice(&mut self, fixed_dt: f64, remaining: Duration) -> bool {
        let started = Instant::now();
        let mut arena = self.arena.borrow_mut();
        let Arena {
            cooldowns,
            commands,
            activations,
            ..
        } = &mut *arena;

        loop {
            let end = self.cursor.saturating_add(SWEEP_CHUNK).min(cooldowns.len());
            let chunk = cooldowns.get_mut(self.cursor..end).unwrap_or_default();
            for (offset, cooldown) in chunk.iter_mut().enumerate() {
                let agent = self.cursor.saturating_add(offset);
                *cooldown = (*cooldown - fixed_dt).max(0.0);
                if *cooldown <= 0.0 && commands.contains(&agent) {
                    *cooldown = ABILITY_COOLDOWN_SECONDS;
                    activations.push(agent);
                }
            }
            self.cursor = end;

            if self.cursor >= cooldowns.len() {
                commands.clear();
                self.cursor = 0;
                return true;
            }
            if started.elapsed() >= remaining {
                debug!(cursor = self.cursor, "Ability sweep yielded");
                return false;
            }
        }
    }

    fn reset_slice(&mut self) {
        self.cursor = 0;
        let mut arena = self.arena.borrow_mut();
        arena.activations.clear();
    }
}

/// Applies fired abilities to the physics world and queues events.
struct EffectResolver {
    arena: SharedArena,
    physics: SharedPhysics,
}

impl SimUnit for EffectResolver {
    fn update(&mut self, _fixed_dt: f64) {
        let mut arena = self.arena.borrow_mut();
        let fired: Vec<usize> = arena.activations.drain(..).collect();
        if fired.is_empty() {
            return;
        }
        let mut physics = self.physics.borrow_mut();
        let bodies = physics.world().body_count();
        for &agent in &fired {
            if bodies > 0 {
                physics.world_mut().launch(agent % bodies);
            }
            arena.events.push(GameEvent::Launched { agent });
        }
        let fired_count = u64::try_from(fired.len()).unwrap_or(u64::MAX);
        arena.totals.activations = arena.totals.activations.saturating_add(fired_count);
    }
}

/// Drains the event queue.
struct EventDispatcher {
    arena: SharedArena,
}

impl SimUnit for EventDispatcher {
    fn update(&mut self, _fixed_dt: f64) {
        let mut arena = self.arena.borrow_mut();
        let mut dispatched = 0_u64;
        for event in arena.events.drain(..) {
            match event {
                GameEvent::Launched { agent } => debug!(agent, "Ability launched body"),
            }
            dispatched = dispatched.saturating_add(1);
        }
        arena.totals.events = arena.totals.events.saturating_add(dispatched);
    }
}

/// Assemble the five-phase demo pipeline.
pub fn build_pipeline(
    arena: &SharedArena,
    physics: &SharedPhysics,
    seed: u64,
) -> CooperativeExecutor {
    CooperativeExecutor::new(vec![
        Phase::new("input").with_unit(Unit::plain(
            "sample_commands",
            InputSampler {
                arena: Rc::clone(arena),
                rng: SmallRng::seed_from_u64(seed),
            },
        )),
        Phase::new("abilities").with_unit(Unit::sliced(
            "ability_sweep",
            AbilitySweep {
                arena: Rc::clone(arena),
                cursor: 0,
            },
        )),
        Phase::new("effects").with_unit(Unit::plain(
            "resolve_effects",
            EffectResolver {
                arena: Rc::clone(arena),
                physics: Rc::clone(physics),
            },
        )),
        Phase::new("physics").with_unit(Unit::plain("bodies", Rc::clone(physics))),
        Phase::new("events").with_unit(Unit::plain(
            "dispatch_events",
            EventDispatcher {
                arena: Rc::clone(arena),
            },
        )),
    ])
}

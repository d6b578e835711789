//! Headless driver for the Cadence scheduler.
//!
//! Wires a demonstration gameplay pipeline and a physics sub-simulation to
//! a loop controller, feeds it jittered frame times from a seeded generator,
//! and prints a JSON summary when done.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `cadence-config.yaml` (or the path given as
//!    the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Validate timing and sub-simulation settings
//! 4. Build the physics rate policy, run controller, and sub-stepper
//! 5. Assemble the five-phase pipeline
//! 6. Drive the loop controller for the configured number of frames,
//!    pausing and single-stepping half way through
//! 7. Print the summary

mod demo;
mod error;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use cadence_core::clock::{Clock, MonotonicClock};
use cadence_core::config::{LoggingConfig, SchedulerConfig};
use cadence_core::controller::LoopController;
use cadence_core::notify::TracingSink;
use cadence_core::pacemaker::{ContinuousPacemaker, TickTarget, TurnBasedPacemaker};
use cadence_core::policy::RatePolicy;
use cadence_core::run::RunController;
use cadence_core::substep::SubStepper;
use cadence_types::{FrameReport, PacemakerStatus, RunStatus};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::demo::{Arena, ArenaTotals, BodyWorld};
use crate::error::HarnessError;

/// Config file used when no path is given.
const DEFAULT_CONFIG_PATH: &str = "cadence-config.yaml";

/// Seconds of sub-simulation the startup settle run may take.
const SETTLE_SECONDS: u64 = 10;

/// Frames the loop stays paused for in the middle of the run.
const PAUSE_FRAMES: u64 = 30;

/// Ticks stepped by hand while paused.
const PAUSE_STEP_TICKS: u64 = 5;

/// Final report printed to stdout.
#[derive(Debug, Serialize)]
struct Summary {
    frames: u64,
    wall_seconds: f64,
    fuse_resets: u64,
    frame_totals: FrameReport,
    scheduler: PacemakerStatus,
    physics: PhysicsSummary,
    gameplay: ArenaTotals,
}

/// Physics portion of the summary.
#[derive(Debug, Serialize)]
struct PhysicsSummary {
    run: RunStatus,
    sub_ticks: u64,
    bodies: usize,
    awake_bodies: usize,
    alpha: f64,
}

/// Application entry point for the harness.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the summary cannot be
/// serialized.
#[allow(clippy::too_many_lines)]
fn main() -> Result<(), HarnessError> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("cadence-harness starting");
    if from_file {
        info!(path = %config_path.display(), "Configuration loaded");
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
    }

    // 3. Validate.
    let fixed = config.validate()?;
    let budget = config.timing.budget();
    info!(
        fixed_hz = fixed.hz(),
        budget_ms = budget.time().as_millis(),
        max_slices = budget.max_slices(),
        max_ticks_per_frame = config.timing.max_ticks_per_frame,
        "Timing validated"
    );

    // 4. Physics sub-simulation.
    let sub = &config.sub_simulation;
    let policy = Arc::new(RatePolicy::with_settings(fixed, 0, sub.max_sub_steps)?);
    let run = RunController::new(
        policy,
        sub.default_rate_hz,
        Box::new(TracingSink { label: "physics" }),
    )?;
    let mut rng = SmallRng::seed_from_u64(config.harness.seed);
    let bodies = usize::try_from(config.harness.bodies).unwrap_or(usize::MAX);
    let world = BodyWorld::new(bodies, &mut rng);
    let physics = Rc::new(RefCell::new(SubStepper::new(world, run)));
    if sub.start_enabled {
        let max_ticks = u64::from(sub.default_rate_hz).saturating_mul(SETTLE_SECONDS);
        physics.borrow_mut().run_mut().run_until_sleeping(max_ticks)?;
    }

    // 5. Pipeline.
    let agents = usize::try_from(config.harness.agents).unwrap_or(usize::MAX);
    let arena = Rc::new(RefCell::new(Arena::new(agents)));
    let mut executor = demo::build_pipeline(&arena, &physics, config.harness.seed);
    executor.set_on_tick_complete(|tick| debug!(tick, "Fixed tick complete"));
    info!(
        phases = ?executor.phase_names().collect::<Vec<_>>(),
        agents,
        bodies,
        "Pipeline assembled"
    );

    // 6. Frame loop.
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut controller = LoopController::from_parts(
        ContinuousPacemaker::new(fixed, Arc::clone(&clock))
            .with_max_ticks_per_frame(config.timing.max_ticks_per_frame),
        TurnBasedPacemaker::new(fixed, clock),
    );

    let harness = &config.harness;
    let pause_at = harness.frames / 2;
    let resume_at = pause_at.saturating_add(PAUSE_FRAMES);
    let mut totals = FrameReport::default();
    let mut fuse_resets = 0_u64;
    let mut wall_seconds = 0.0_f64;

    for frame in 0..harness.frames {
        if frame == pause_at {
            controller.pause();
            controller.advance_ticks(PAUSE_STEP_TICKS);
        } else if frame == resume_at {
            controller.resume();
        }

        let jitter = rng.random_range(-harness.jitter_ms..=harness.jitter_ms);
        let wall_dt = (harness.mean_frame_ms + jitter).max(0.0) / 1000.0;
        wall_seconds += wall_dt;

        let report = controller.frame(wall_dt, TickTarget::cooperative(&mut executor, budget));
        totals.merge(&report);
        if report.fused {
            warn!(frame, "Scheduler fused, resetting");
            controller.reset(Some(&mut executor));
            fuse_resets = fuse_resets.saturating_add(1);
        }
    }

    // 7. Summary.
    let physics = physics.borrow();
    let summary = Summary {
        frames: harness.frames,
        wall_seconds,
        fuse_resets,
        frame_totals: totals,
        scheduler: controller.status(),
        physics: PhysicsSummary {
            run: physics.run().status(),
            sub_ticks: physics.sub_ticks(),
            bodies: physics.world().body_count(),
            awake_bodies: physics.world().awake(),
            alpha: physics.alpha(),
        },
        gameplay: arena.borrow().totals(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    info!(
        total_ticks = summary.scheduler.total_ticks,
        fuse_resets, "cadence-harness shutdown complete"
    );
    Ok(())
}

/// Load the scheduler configuration, falling back to defaults when the
/// file does not exist. The flag says whether the file was read.
fn load_config(path: &Path) -> Result<(SchedulerConfig, bool), HarnessError> {
    if path.exists() {
        Ok((SchedulerConfig::from_file(path)?, true))
    } else {
        Ok((SchedulerConfig::default(), false))
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

//! Deterministic fixed-step simulation scheduler.
//!
//! This crate decides, every real-time frame, how many fixed simulation
//! ticks to run, in what order, under what time budget, and how to resume
//! work that did not fit. It is strictly single-threaded and cooperative:
//! nothing here blocks, spawns, or preempts.
//!
//! # Modules
//!
//! - [`clock`] -- Monotonic time source trait plus real and manual clocks.
//! - [`rate`] -- Integer-Hz fixed rates and the exact rational
//!   [`RateDistributor`] for decoupled sub-simulation rates.
//! - [`policy`] -- Versioned, shared [`RatePolicy`] settings.
//! - [`executor`] -- Resumable, budgeted walk over an ordered list of phases.
//! - [`pacemaker`] -- Continuous and turn-based conversion of wall-clock
//!   time into fixed ticks, with the budget fuse.
//! - [`controller`] -- Runtime switching between pacemaker variants.
//! - [`notify`] -- Notification sinks for run lifecycle messages.
//! - [`run`] -- Sub-simulation run controller (enable, bounded runs,
//!   run-until-quiescent).
//! - [`substep`] -- Drives a sub-simulation at its own rate inside the
//!   fixed tick.
//! - [`config`] -- YAML configuration loading.
//!
//! [`RateDistributor`]: rate::RateDistributor
//! [`RatePolicy`]: policy::RatePolicy

pub mod clock;
pub mod config;
pub mod controller;
pub mod executor;
pub mod notify;
pub mod pacemaker;
pub mod policy;
pub mod rate;
pub mod run;
pub mod substep;

//! Shared value types for the Cadence fixed-step scheduler.
//!
//! Everything in this crate is plain data: it crosses the boundary between
//! the scheduler core, its notification sinks, and whatever host embeds it
//! (the headless harness, a game client, a test). All types serialize with
//! `serde` so status snapshots and notifications can be logged or shipped
//! as JSON.
//!
//! # Modules
//!
//! - [`enums`] -- Loop modes, step outcomes, run modes, and completion reasons
//! - [`notification`] -- Messages emitted by the sub-simulation run controller
//! - [`status`] -- Per-frame reports and point-in-time status snapshots

pub mod enums;
pub mod notification;
pub mod status;

pub use enums::{CompletionReason, LoopMode, RunMode, StepOutcome};
pub use notification::RunNotification;
pub use status::{FrameReport, PacemakerStatus, RunStatus};

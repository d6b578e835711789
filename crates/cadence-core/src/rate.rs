//! Fixed tick rates and the decoupled sub-simulation rate distributor.
//!
//! # Fixed rates
//!
//! A [`FixedRate`] is always a whole number of ticks per second. Deltas
//! that do not round-trip through `1 / round(1 / dt)` (for example `0.017`)
//! are rejected instead of being silently rounded, because a fixed tick that
//! is "almost" 60 Hz drifts against anything that assumes it is exactly 60.
//!
//! # Rate distribution
//!
//! [`RateDistributor`] answers "how many sub-steps at `T` Hz fit inside
//! this `F` Hz tick?" with a Bresenham-style integer carry:
//!
//! ```text
//! carry     = remainder + T
//! steps     = carry / F
//! remainder = carry % F
//! ```
//!
//! Over `N` calls the total is exactly `floor(N * T / F)`, so the long-run
//! average converges to `T / F` with no accumulated drift.
//!
//! The sub-simulation interpolation factor ([`RateDistributor::alpha`]) is
//! `remainder / F`. It is **not** the same signal as the outer pacemaker's
//! alpha: the outer alpha says how far wall-clock time is into the next
//! fixed tick, the sub-simulation alpha says how far the fixed tick is into
//! the next sub-step. Renderers that blend sub-simulated state must use the
//! latter.

use std::time::Duration;

/// Largest allowed difference, in seconds, between a configured fixed delta
/// and `1 / hz` for the rounded `hz`.
const HZ_ROUND_TRIP_EPSILON: f64 = 1e-7;

/// Errors raised while configuring rates.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RateError {
    /// The fixed delta is zero, negative, or not finite.
    #[error("fixed delta time must be a positive finite number of seconds, got {delta}")]
    InvalidFixedDelta {
        /// The rejected delta in seconds.
        delta: f64,
    },

    /// The fixed delta is not `1 / n` for any whole `n`.
    #[error("fixed delta time {delta}s is not a whole tick rate (nearest is {nearest_hz} Hz)")]
    NonIntegerHz {
        /// The rejected delta in seconds.
        delta: f64,
        /// The closest whole rate.
        nearest_hz: u32,
    },

    /// A fixed rate of zero Hz was requested.
    #[error("fixed tick rate must be at least 1 Hz")]
    ZeroFixedRate,

    /// The sub-step cap is below one.
    #[error("max sub-steps per fixed tick must be at least 1, got {requested}")]
    InvalidMaxSubSteps {
        /// The rejected cap.
        requested: u32,
    },

    /// The target rate needs more sub-steps per tick than the cap allows.
    #[error(
        "target rate {target_hz} Hz needs up to {required} sub-steps per {fixed_hz} Hz tick, \
         cap is {cap}"
    )]
    RateExceedsCap {
        /// Requested sub-simulation rate.
        target_hz: u32,
        /// Outer fixed tick rate.
        fixed_hz: u32,
        /// Worst-case sub-steps per tick, `ceil(target / fixed)`.
        required: u32,
        /// Configured cap.
        cap: u32,
    },
}

/// A validated, whole-number fixed tick rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedRate {
    hz: u32,
}

impl FixedRate {
    /// Build a rate from a tick frequency.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::ZeroFixedRate`] if `hz` is 0.
    pub const fn from_hz(hz: u32) -> Result<Self, RateError> {
        if hz == 0 {
            return Err(RateError::ZeroFixedRate);
        }
        Ok(Self { hz })
    }

    /// Build a rate from a fixed delta time in seconds.
    ///
    /// The delta must survive the round trip `1 / round(1 / delta)` within
    /// a tight epsilon.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidFixedDelta`] for non-positive or
    /// non-finite deltas (or deltas too small to express in `u32` Hz), and
    /// [`RateError::NonIntegerHz`] when the delta is not `1 / n`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_delta(delta: f64) -> Result<Self, RateError> {
        if !delta.is_finite() || delta <= 0.0 {
            return Err(RateError::InvalidFixedDelta { delta });
        }
        let nearest = delta.recip().round();
        if !(1.0..=f64::from(u32::MAX)).contains(&nearest) {
            return Err(RateError::InvalidFixedDelta { delta });
        }
        // Range checked above, so the cast is exact.
        let hz = nearest as u32;
        let round_trip = f64::from(hz).recip();
        if (round_trip - delta).abs() > HZ_ROUND_TRIP_EPSILON {
            return Err(RateError::NonIntegerHz {
                delta,
                nearest_hz: hz,
            });
        }
        Ok(Self { hz })
    }

    /// Ticks per second.
    pub const fn hz(self) -> u32 {
        self.hz
    }

    /// Seconds per tick.
    pub fn delta_seconds(self) -> f64 {
        f64::from(self.hz).recip()
    }

    /// One tick as a [`Duration`].
    pub fn tick_duration(self) -> Duration {
        Duration::from_secs_f64(self.delta_seconds())
    }

    /// Simulated seconds covered by `ticks` ticks.
    #[allow(clippy::cast_precision_loss)]
    pub fn seconds_for_ticks(self, ticks: u64) -> f64 {
        ticks as f64 / f64::from(self.hz)
    }
}

/// Worst-case sub-steps per fixed tick for a target rate: `ceil(T / F)`.
pub const fn worst_case_steps(target_hz: u32, fixed: FixedRate) -> u32 {
    target_hz.div_ceil(fixed.hz)
}

/// Check that `target_hz` fits under `max_steps` sub-steps per fixed tick.
///
/// # Errors
///
/// Returns [`RateError::InvalidMaxSubSteps`] if `max_steps` is 0 and
/// [`RateError::RateExceedsCap`] if the worst case exceeds the cap.
pub const fn check_cap(target_hz: u32, fixed: FixedRate, max_steps: u32) -> Result<(), RateError> {
    if max_steps == 0 {
        return Err(RateError::InvalidMaxSubSteps {
            requested: max_steps,
        });
    }
    let required = worst_case_steps(target_hz, fixed);
    if required > max_steps {
        return Err(RateError::RateExceedsCap {
            target_hz,
            fixed_hz: fixed.hz,
            required,
            cap: max_steps,
        });
    }
    Ok(())
}

/// Exact rational converter from a fixed tick rate to a sub-step rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDistributor {
    /// Target sub-step rate `T`.
    numerator: u32,
    /// Fixed tick rate `F`.
    denominator: u32,
    /// Fractional carry, always `< denominator`.
    remainder: u32,
    /// Sub-step cap the rate was validated against.
    max_steps: u32,
}

impl RateDistributor {
    /// Create a distributor for `target_hz` sub-steps per second inside
    /// `fixed` ticks, starting with an empty carry.
    ///
    /// A target rate of zero is valid and always yields zero sub-steps.
    ///
    /// # Errors
    ///
    /// Fails immediately (never clamps) if `ceil(target / fixed)` exceeds
    /// `max_steps_per_tick`, or if the cap is 0.
    pub const fn new(
        target_hz: u32,
        fixed: FixedRate,
        max_steps_per_tick: u32,
    ) -> Result<Self, RateError> {
        if let Err(err) = check_cap(target_hz, fixed, max_steps_per_tick) {
            return Err(err);
        }
        Ok(Self {
            numerator: target_hz,
            denominator: fixed.hz,
            remainder: 0,
            max_steps: max_steps_per_tick,
        })
    }

    /// Number of sub-steps to run inside the next fixed tick.
    pub fn next_steps(&mut self) -> u32 {
        // remainder < F and T both fit in u32, so the sum fits in u64.
        let carry = u64::from(self.remainder).saturating_add(u64::from(self.numerator));
        let denominator = u64::from(self.denominator);
        let steps = carry.checked_div(denominator).unwrap_or(0);
        let remainder = carry.checked_rem(denominator).unwrap_or(0);
        self.remainder = u32::try_from(remainder).unwrap_or(0);
        u32::try_from(steps).unwrap_or(self.max_steps)
    }

    /// Sub-simulation interpolation factor, `remainder / F`, in `[0, 1)`.
    pub fn alpha(&self) -> f64 {
        f64::from(self.remainder) / f64::from(self.denominator)
    }

    /// Current fractional carry.
    pub const fn remainder(&self) -> u32 {
        self.remainder
    }

    /// Target sub-step rate in Hz.
    pub const fn target_hz(&self) -> u32 {
        self.numerator
    }

    /// Outer fixed rate in Hz.
    pub const fn fixed_hz(&self) -> u32 {
        self.denominator
    }

    /// Sub-step cap this distributor was validated against.
    pub const fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Seconds per sub-step, or 0 when the target rate is 0.
    pub fn sub_step_seconds(&self) -> f64 {
        if self.numerator == 0 {
            return 0.0;
        }
        f64::from(self.numerator).recip()
    }
}

//! Versioned rate settings shared between a configurer and a consumer.
//!
//! [`RatePolicy`] is the only piece of cross-component mutable state in the
//! scheduler. The run controller writes it; the sub-stepper reads it once
//! per fixed tick. Consumers never diff the settings themselves: they
//! compare [`RatePolicy::version`] against the version they last built
//! derived state from, and rebuild only when it moved.
//!
//! # Versioning
//!
//! - Version 0 means "never configured" and only exists at construction.
//! - Every effective change bumps the version by one; on overflow it wraps
//!   to 1, never back to 0.
//! - Setting a value equal to the current one is a no-op once the policy
//!   has been configured at least once.
//!
//! All fields are atomics so the policy can sit behind an [`Arc`] without a
//! lock; there is a single writer, so no compare-and-swap loop is needed.
//!
//! [`Arc`]: std::sync::Arc

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::rate::{self, FixedRate, RateError};

/// Point-in-time copy of a [`RatePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSettings {
    /// Sub-simulation target rate in Hz (0 = disabled).
    pub target_hz: u32,
    /// Maximum sub-steps allowed inside one fixed tick.
    pub max_sub_steps: u32,
    /// Version the settings were read at.
    pub version: u64,
}

/// Versioned sub-simulation rate settings.
#[derive(Debug)]
pub struct RatePolicy {
    /// Outer fixed rate every target rate is validated against.
    fixed: FixedRate,
    /// Sub-simulation target rate in Hz.
    target_hz: AtomicU32,
    /// Sub-step cap per fixed tick.
    max_sub_steps: AtomicU32,
    /// Change counter; 0 = never configured.
    version: AtomicU64,
}

impl RatePolicy {
    /// Create an unconfigured policy: target 0 Hz, cap 1, version 0.
    pub const fn new(fixed: FixedRate) -> Self {
        Self {
            fixed,
            target_hz: AtomicU32::new(0),
            max_sub_steps: AtomicU32::new(1),
            version: AtomicU64::new(0),
        }
    }

    /// Create a policy and apply both settings.
    ///
    /// # Errors
    ///
    /// Returns [`RateError`] if the cap is 0 or the target rate does not
    /// fit under it.
    pub fn with_settings(
        fixed: FixedRate,
        target_hz: u32,
        max_sub_steps: u32,
    ) -> Result<Self, RateError> {
        let policy = Self::new(fixed);
        policy.set_max_sub_steps(max_sub_steps)?;
        policy.set_target_rate(target_hz)?;
        Ok(policy)
    }

    /// Set the sub-simulation target rate. Returns whether the version moved.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::RateExceedsCap`] if the rate needs more sub-steps
    /// per fixed tick than the current cap. The policy is left unchanged.
    pub fn set_target_rate(&self, target_hz: u32) -> Result<bool, RateError> {
        let current = self.target_hz.load(Ordering::Acquire);
        if current == target_hz && self.is_initialized() {
            return Ok(false);
        }
        rate::check_cap(target_hz, self.fixed, self.max_sub_steps())?;
        self.target_hz.store(target_hz, Ordering::Release);
        self.bump_version();
        Ok(true)
    }

    /// Set the sub-step cap. Returns whether the version moved.
    ///
    /// # Errors
    ///
    /// Returns [`RateError::InvalidMaxSubSteps`] for 0, or
    /// [`RateError::RateExceedsCap`] if the current target rate would no
    /// longer fit. The policy is left unchanged.
    pub fn set_max_sub_steps(&self, max_sub_steps: u32) -> Result<bool, RateError> {
        if max_sub_steps == 0 {
            return Err(RateError::InvalidMaxSubSteps {
                requested: max_sub_steps,
            });
        }
        let current = self.max_sub_steps.load(Ordering::Acquire);
        if current == max_sub_steps && self.is_initialized() {
            return Ok(false);
        }
        rate::check_cap(self.target_rate_hz(), self.fixed, max_sub_steps)?;
        self.max_sub_steps.store(max_sub_steps, Ordering::Release);
        self.bump_version();
        Ok(true)
    }

    /// Current change counter.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Whether any setter has taken effect yet.
    pub fn is_initialized(&self) -> bool {
        self.version() != 0
    }

    /// Current target rate in Hz.
    pub fn target_rate_hz(&self) -> u32 {
        self.target_hz.load(Ordering::Acquire)
    }

    /// Whether the sub-simulation is switched on (target rate above 0).
    pub fn is_enabled(&self) -> bool {
        self.target_rate_hz() > 0
    }

    /// Current sub-step cap.
    pub fn max_sub_steps(&self) -> u32 {
        self.max_sub_steps.load(Ordering::Acquire)
    }

    /// Outer fixed rate the policy validates against.
    pub const fn fixed_rate(&self) -> FixedRate {
        self.fixed
    }

    /// Read all settings at once.
    ///
    /// The version is read first, so a consumer that caches on the returned
    /// version will at worst rebuild once more than necessary.
    pub fn settings(&self) -> RateSettings {
        let version = self.version();
        RateSettings {
            target_hz: self.target_rate_hz(),
            max_sub_steps: self.max_sub_steps(),
            version,
        }
    }

    fn bump_version(&self) {
        let next = self.version().wrapping_add(1);
        self.version
            .store(if next == 0 { 1 } else { next }, Ordering::Release);
    }

    #[cfg(test)]
    fn force_version(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }
}

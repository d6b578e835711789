//! Error types for the harness binary.
//!
//! [`HarnessError`] wraps every failure mode of startup and the frame loop
//! so `main` can propagate with `?`.

/// Top-level error for the harness binary.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cadence_core::config::ConfigError,
    },

    /// A rate setting was rejected while wiring the scheduler.
    #[error("rate error: {source}")]
    Rate {
        /// The underlying rate error.
        #[from]
        source: cadence_core::rate::RateError,
    },

    /// The physics run controller rejected a request.
    #[error("run error: {source}")]
    Run {
        /// The underlying run error.
        #[from]
        source: cadence_core::run::RunError,
    },

    /// The final summary could not be serialized.
    #[error("summary serialization failed: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

//! Notification sinks for sub-simulation run lifecycle messages.
//!
//! A [`NotificationSink`] receives the fixed set of [`RunNotification`]
//! shapes. Closures work as sinks directly; [`RecordingSink`] keeps an
//! in-memory log that can be inspected from outside the controller, and
//! [`TracingSink`] turns every message into a structured log line.

use std::cell::RefCell;
use std::rc::Rc;

use cadence_types::RunNotification;
use tracing::info;

/// Receiver of run lifecycle notifications.
pub trait NotificationSink {
    /// Handle one notification.
    fn notify(&mut self, notification: &RunNotification);
}

impl<F: FnMut(&RunNotification)> NotificationSink for F {
    fn notify(&mut self, notification: &RunNotification) {
        self(notification);
    }
}

/// Sink that appends every notification to a shared log.
///
/// Clones share the same log, so keep one handle and give the other to the
/// controller.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Rc<RefCell<Vec<RunNotification>>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn notifications(&self) -> Vec<RunNotification> {
        self.log.borrow().clone()
    }

    /// Only the `RunCompleted` notifications, as `(reason, elapsed)` pairs.
    pub fn completions(&self) -> Vec<(cadence_types::CompletionReason, u64)> {
        self.log
            .borrow()
            .iter()
            .filter_map(RunNotification::completion)
            .collect()
    }

    /// Number of notifications recorded.
    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&mut self, notification: &RunNotification) {
        self.log.borrow_mut().push(*notification);
    }
}

/// Sink that logs each notification at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    /// Name of the sub-simulation, attached to every log line.
    pub label: &'static str,
}

impl NotificationSink for TracingSink {
    fn notify(&mut self, notification: &RunNotification) {
        match *notification {
            RunNotification::Enabled { rate_hz } => {
                info!(sim = self.label, rate_hz, "Sub-simulation enabled");
            }
            RunNotification::Disabled => {
                info!(sim = self.label, "Sub-simulation disabled");
            }
            RunNotification::RunStarted { mode, max_ticks } => {
                info!(sim = self.label, ?mode, max_ticks, "Sub-simulation run started");
            }
            RunNotification::RunCompleted {
                reason,
                elapsed_ticks,
            } => {
                info!(
                    sim = self.label,
                    reason = reason.as_str(),
                    elapsed_ticks,
                    "Sub-simulation run completed"
                );
            }
        }
    }
}

//! User feedback channel
//!
//! The engine reports progress and failures through this trait instead of
//! talking to any UI directly. Implementations must never fail loudly: a
//! broken feedback path is not allowed to mask or replace the primary
//! backup outcome, so every method is infallible by construction.

use std::collections::HashSet;
use std::sync::Mutex;

use tracing::{debug, error, info};

/// Spoken/toast-style progress feedback.
pub trait Feedback: Send + Sync {
    /// Announce a progress milestone ("starting backup").
    fn speak(&self, message: &str);

    /// Announce a failure. Implementations should announce each distinct
    /// message at most once per channel lifetime.
    fn error(&self, message: &str);

    /// Low-priority notification ("backed up 3").
    fn toast(&self, message: &str);
}

/// Discards everything.
pub struct SilentFeedback;

impl Feedback for SilentFeedback {
    fn speak(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn toast(&self, _message: &str) {}
}

/// Routes feedback into the tracing log stream.
///
/// Error messages are deduplicated: the first occurrence is logged at
/// error level, repeats only at debug level.
#[derive(Default)]
pub struct TracingFeedback {
    seen_errors: Mutex<HashSet<String>>,
}

impl TracingFeedback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Feedback for TracingFeedback {
    fn speak(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        let mut seen = match self.seen_errors.lock() {
            Ok(seen) => seen,
            Err(poisoned) => poisoned.into_inner(),
        };
        if seen.insert(message.to_string()) {
            error!("{}", message);
        } else {
            debug!("repeated error: {}", message);
        }
    }

    fn toast(&self, message: &str) {
        info!("{}", message);
    }
}

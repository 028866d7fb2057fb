#![forbid(unsafe_code)]

//! Stop flags for listener threads.
//!
//! Each key listener or input pump owns a [`CancellationToken`] and checks
//! it between polls of its key subscription. The matching
//! [`CancellationSource`] is stored in the run's scoped data with a
//! disposer that cancels it, so stopping the run lifecycle stops the thread
//! within one poll interval.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::trace;

/// Triggers cancellation. Dropping the source does not cancel.
#[derive(Clone)]
pub struct CancellationSource {
    label: &'static str,
    cancelled: Arc<AtomicBool>,
}

/// Observes a [`CancellationSource`]. Cheap to clone.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl fmt::Debug for CancellationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSource")
            .field("label", &self.label)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancellationToken").field(&self.is_cancelled()).finish()
    }
}

impl CancellationSource {
    /// A source named after the thread it stops, for logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            trace!(listener = self.label, "listener cancelled");
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl CancellationToken {
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn every_token_sees_cancel() {
        let source = CancellationSource::new("keys");
        let first = source.token();
        let second = first.clone();
        assert!(!second.is_cancelled());
        source.clone().cancel();
        assert!(first.is_cancelled() && second.is_cancelled());
        assert!(source.is_cancelled());
    }

    #[test]
    fn dropping_source_leaves_token_live() {
        let token = CancellationSource::new("input").token();
        assert!(!token.is_cancelled());
    }

    #[test]
    #[traced_test]
    fn cancel_logs_once() {
        let source = CancellationSource::new("sectui-input");
        source.cancel();
        source.cancel();
        assert!(logs_contain("listener cancelled"));
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("listener cancelled")).count() {
                1 => Ok(()),
                n => Err(format!("expected one cancel event, got {n}")),
            }
        });
    }
}

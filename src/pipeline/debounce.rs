//! Timeout-gated duplicate suppression.

use std::time::Duration;

/// Suppresses re-sending the last dispatched class within a timeout.
///
/// Timestamps are seconds on the classifier's clock. A repeat is suppressed
/// only while strictly less than `timeout` has elapsed; a different class is
/// always dispatched.
#[derive(Debug, Clone)]
pub struct Debouncer {
    timeout: f64,
    last: Option<(usize, f64)>,
}

impl Debouncer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout: timeout.as_secs_f64(), last: None }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn should_dispatch(&self, class_index: usize, timestamp: f64) -> bool {
        match self.last {
            Some((last_index, last_at)) if last_index == class_index => {
                // A clock that runs backwards counts as no time elapsed
                timestamp - last_at >= self.timeout
            }
            _ => true,
        }
    }

    /// Note a completed dispatch.
    pub fn record(&mut self, class_index: usize, timestamp: f64) {
        self.last = Some((class_index, timestamp));
    }

    /// Class index and timestamp of the last dispatch.
    pub fn last_dispatched(&self) -> Option<(usize, f64)> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

//! Classifier feed rate control

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Rate at which classifier output is forwarded to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRate {
    /// Forward every prediction the classifier produces
    #[default]
    Native,

    /// Forward at most this many predictions per second, latest wins.
    /// A rate at or above the classifier's own rate behaves like `Native`.
    Max(u32),
}

impl UpdateRate {
    /// Effective rate against a classifier producing `source_hz` predictions per second.
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(0) => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_hz => UpdateRate::Native,
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Sampling interval, or `None` when every prediction is forwarded.
    pub fn interval(self, source_hz: f64) -> Option<Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

//! Gesture pipeline: predictions in, hand commands out.
//!
//! The consumer loop drains the prediction channel without blocking, smooths
//! each sample's class index over a sliding window, suppresses repeats of the
//! last dispatched gesture within the debounce timeout, and sends what remains
//! to the hand.
//!
//! ```text
//! Idle --connect--> Running --stop/end/errors--> Stopping --disconnect--> Stopped
//! ```

pub mod channel;
pub mod debounce;
pub mod smoothing;

pub use channel::{Drained, PredictionReceiver, PredictionSender, prediction_channel};
pub use debounce::Debouncer;
pub use smoothing::{SmoothingBuffer, SmoothingMethod};

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::PipelineConfig;
use crate::hand::HandInterface;
use crate::types::{GestureLabel, GestureSet, PredictionSample};
use crate::{LinkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No hand connected yet
    Idle,
    /// Draining predictions and sending gestures
    Running,
    /// Shutting down; no new sends
    Stopping,
    /// Terminal
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What to do with one sample after smoothing and debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Dispatch(usize),
    Suppress(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub received: u64,
    pub dispatched: u64,
    pub suppressed: u64,
    /// Samples whose class index was out of range
    pub coerced: u64,
    pub send_errors: u64,
}

/// Why the pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The producer sent the sentinel or went away
    EndOfStream,
    Cancelled,
    /// Consecutive send failures reached the configured limit
    TooManyErrors,
    /// The hand could not be connected
    ConnectFailed,
}

#[derive(Debug)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    pub stats: PipelineStats,
    /// The error that ended the run, for `TooManyErrors` and `ConnectFailed`
    pub error: Option<LinkError>,
}

/// The consumer side of the prediction channel.
///
/// Owns the hand for its whole life; the gesture set, window and timeout are
/// fixed at construction.
pub struct GesturePipeline<H> {
    hand: H,
    gestures: GestureSet,
    smoothing: SmoothingBuffer,
    debouncer: Debouncer,
    poll_interval: Duration,
    max_consecutive_errors: u32,
    stats: PipelineStats,
}

impl<H: HandInterface> GesturePipeline<H> {
    pub fn new(hand: H, gestures: GestureSet, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            hand,
            gestures,
            smoothing: SmoothingBuffer::new(config.smoothing_window, config.smoothing_method)?,
            debouncer: Debouncer::new(config.debounce()),
            poll_interval: config.poll_interval(),
            max_consecutive_errors: config.max_consecutive_errors.max(1),
            stats: PipelineStats::default(),
        })
    }

    pub fn hand(&self) -> &H {
        &self.hand
    }

    pub fn hand_mut(&mut self) -> &mut H {
        &mut self.hand
    }

    pub fn gestures(&self) -> &GestureSet {
        &self.gestures
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Smooth and debounce one sample without sending anything.
    pub fn evaluate(&mut self, sample: &PredictionSample) -> Decision {
        self.stats.received += 1;
        let class_index = self.gestures.coerce_index(sample.class_index);
        if class_index != sample.class_index {
            self.stats.coerced += 1;
        }

        let smoothed = self.smoothing.push(class_index);
        if self.debouncer.should_dispatch(smoothed, sample.timestamp) {
            Decision::Dispatch(smoothed)
        } else {
            self.stats.suppressed += 1;
            Decision::Suppress(smoothed)
        }
    }

    /// Evaluate one sample and send the resulting gesture, if any.
    ///
    /// The debounce clock only advances on a successful send, so a failed
    /// gesture is retried by the next sample.
    pub async fn process(&mut self, sample: &PredictionSample) -> Result<Decision> {
        let decision = self.evaluate(sample);
        let Decision::Dispatch(class_index) = decision else {
            trace!(class_index = sample.class_index, t = sample.timestamp, "Suppressed repeat");
            return Ok(decision);
        };

        // Coerced and smoothed indices are always in range
        let label = self.gestures.get(class_index).cloned().ok_or_else(|| {
            LinkError::invalid_argument("class index", format!("{class_index} is not a configured class"))
        })?;

        if let Err(e) = self.hand.send_gesture(&label).await {
            self.stats.send_errors += 1;
            return Err(e);
        }
        self.debouncer.record(class_index, sample.timestamp);
        self.stats.dispatched += 1;
        debug!(gesture = %label, t = sample.timestamp, device = self.hand.name(), "Dispatched gesture");
        Ok(decision)
    }

    /// Run until the stream ends, `cancel` fires, or sends keep failing.
    ///
    /// Connects the hand if needed. Every state change is published on `state`
    /// and every dispatched label on `labels`; neither waits for receivers.
    /// The hand is disconnected before returning.
    pub async fn run(
        mut self,
        mut receiver: PredictionReceiver,
        cancel: CancellationToken,
        state: watch::Sender<PipelineState>,
        labels: watch::Sender<Option<GestureLabel>>,
    ) -> PipelineReport {
        state.send_replace(PipelineState::Idle);

        if !self.hand.is_connected() {
            let connected = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.hand.connect() => Some(result),
            };
            match connected {
                None => {
                    info!("Pipeline cancelled while connecting");
                    return self.finish(PipelineOutcome::Cancelled, None, &state, &labels).await;
                }
                Some(Err(e)) => {
                    error!(device = self.hand.name(), "Hand connection failed: {}", e);
                    return self.finish(PipelineOutcome::ConnectFailed, Some(e), &state, &labels).await;
                }
                Some(Ok(())) => {}
            }
        }

        state.send_replace(PipelineState::Running);
        info!(
            device = self.hand.name(),
            classes = self.gestures.len(),
            window = self.smoothing.capacity(),
            debounce = ?self.debouncer.timeout(),
            "Gesture pipeline running"
        );

        let mut error_count = 0u32;
        let mut last_error = None;

        let outcome = 'run: loop {
            if cancel.is_cancelled() {
                break PipelineOutcome::Cancelled;
            }

            let drained = receiver.try_drain();
            if drained.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => break PipelineOutcome::Cancelled,
                    _ = tokio::time::sleep(self.poll_interval) => continue,
                }
            }

            for sample in &drained.samples {
                if cancel.is_cancelled() {
                    break 'run PipelineOutcome::Cancelled;
                }

                match self.process(sample).await {
                    Ok(Decision::Dispatch(class_index)) => {
                        error_count = 0;
                        labels.send_replace(self.gestures.get(class_index).cloned());
                    }
                    Ok(Decision::Suppress(_)) => {}
                    Err(e) => {
                        error_count += 1;
                        error!(
                            device = self.hand.name(),
                            "Gesture send failed ({}/{}): {}",
                            error_count, self.max_consecutive_errors, e
                        );

                        if error_count >= self.max_consecutive_errors {
                            error!("Too many send errors, stopping pipeline");
                            last_error = Some(e);
                            break 'run PipelineOutcome::TooManyErrors;
                        }

                        if e.is_retryable() {
                            // Exponential backoff: 100ms, 200ms, 400ms, ...
                            let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                            tokio::select! {
                                _ = cancel.cancelled() => break 'run PipelineOutcome::Cancelled,
                                _ = tokio::time::sleep(backoff) => {}
                            }
                            self.reconnect().await;
                        }
                    }
                }
            }

            if drained.end_of_stream {
                info!("Prediction stream ended");
                break PipelineOutcome::EndOfStream;
            }
        };

        self.finish(outcome, last_error, &state, &labels).await
    }

    async fn reconnect(&mut self) {
        if self.hand.is_connected() {
            return;
        }
        warn!(device = self.hand.name(), "Hand disconnected, reconnecting");
        if let Err(e) = self.hand.connect().await {
            warn!(device = self.hand.name(), "Reconnect failed: {}", e);
        }
    }

    async fn finish(
        mut self,
        outcome: PipelineOutcome,
        error: Option<LinkError>,
        state: &watch::Sender<PipelineState>,
        labels: &watch::Sender<Option<GestureLabel>>,
    ) -> PipelineReport {
        state.send_replace(PipelineState::Stopping);
        if let Err(e) = self.hand.disconnect().await {
            warn!(device = self.hand.name(), "Disconnect failed: {}", e);
        }
        labels.send_replace(None);
        state.send_replace(PipelineState::Stopped);

        let stats = self.stats;
        info!(
            ?outcome,
            received = stats.received,
            dispatched = stats.dispatched,
            suppressed = stats.suppressed,
            send_errors = stats.send_errors,
            "Gesture pipeline stopped"
        );
        PipelineReport { outcome, stats, error }
    }
}

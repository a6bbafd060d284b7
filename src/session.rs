//! A running gesture pipeline together with its input side.

use std::time::Duration;

use futures::Stream;
use tracing::warn;

use crate::classifier::ClassifierFeed;
use crate::driver::PipelineHandle;
use crate::pipeline::{PipelineReport, PredictionSender};
use crate::types::{PredictionSample, UpdateRate};
use crate::Result;

/// How long `finish` waits for queue space for the end-of-stream marker.
pub const FINISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Input and control handles of a started pipeline.
///
/// Dropping the session stops the pipeline.
pub struct GestureSession {
    predictions: PredictionSender,
    pipeline: PipelineHandle,
}

impl GestureSession {
    pub(crate) fn new(predictions: PredictionSender, pipeline: PipelineHandle) -> Self {
        Self { predictions, pipeline }
    }

    /// Sender for classifier predictions. Clone it for each producer.
    pub fn predictions(&self) -> PredictionSender {
        self.predictions.clone()
    }

    pub fn pipeline(&self) -> &PipelineHandle {
        &self.pipeline
    }

    /// Forward a classifier stream into the pipeline at `rate`.
    pub fn feed<S>(&self, source: S, rate: UpdateRate, source_hz: f64) -> ClassifierFeed
    where
        S: Stream<Item = PredictionSample> + Send + 'static,
    {
        ClassifierFeed::spawn(source, self.predictions.clone(), rate, source_hz)
    }

    /// Signal end of stream and wait for the pipeline to drain and stop.
    ///
    /// If the pipeline does not make room for the end-of-stream marker within
    /// [`FINISH_TIMEOUT`], it is cancelled instead, so this always returns.
    pub async fn finish(self) -> Result<PipelineReport> {
        let Self { predictions, pipeline } = self;
        if let Err(e) = predictions.finish(FINISH_TIMEOUT).await {
            warn!("Pipeline not draining, cancelling: {}", e);
            pipeline.stop();
        }
        pipeline.join().await
    }

    /// Stop immediately; pending predictions are not sent.
    pub async fn shutdown(self) -> Result<PipelineReport> {
        self.pipeline.shutdown().await
    }

    /// Split into the input sender and the pipeline handle.
    pub fn into_parts(self) -> (PredictionSender, PipelineHandle) {
        (self.predictions, self.pipeline)
    }
}

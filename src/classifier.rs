//! Classifier feed: forwards classifier output into the prediction channel.
//!
//! The classifier runs at its own rate. The feed samples it at the configured
//! [`UpdateRate`] (latest wins) and sends the end-of-stream sentinel when the
//! source ends or the feed is stopped, so the pipeline always sees a clean end.

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::PredictionSender;
use crate::session::FINISH_TIMEOUT;
use crate::stream::LatestExt;
use crate::types::{PredictionSample, UpdateRate};
use crate::{LinkError, Result};

pub struct ClassifierFeed {
    cancel: CancellationToken,
    task: Option<JoinHandle<u64>>,
}

impl ClassifierFeed {
    /// Spawn a task forwarding `source` into `sender`.
    ///
    /// `source_hz` is the classifier's own output rate; `rate` at or above it
    /// forwards every sample.
    pub fn spawn<S>(source: S, sender: PredictionSender, rate: UpdateRate, source_hz: f64) -> Self
    where
        S: Stream<Item = PredictionSample> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let cancel_task = cancel.clone();

        let task = tokio::spawn(async move {
            let mut source: BoxStream<'static, PredictionSample> = match rate.interval(source_hz) {
                Some(period) => {
                    debug!(?period, source_hz, "Sampling classifier output");
                    source.sample_latest(period).boxed()
                }
                None => source.boxed(),
            };

            let mut forwarded = 0u64;
            loop {
                let sample = tokio::select! {
                    _ = cancel_task.cancelled() => break,
                    sample = source.next() => sample,
                };
                let Some(sample) = sample else { break };
                if sender.send(sample).await.is_err() {
                    debug!("Prediction channel closed, stopping feed");
                    break;
                }
                forwarded += 1;
            }

            info!(forwarded, "Classifier feed ended");
            if let Err(e) = sender.finish(FINISH_TIMEOUT).await {
                warn!("End of stream not delivered: {}", e);
            }
            forwarded
        });

        Self { cancel, task: Some(task) }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the feed to end; returns the number of samples forwarded.
    pub async fn join(mut self) -> Result<u64> {
        let task = self.task.take().ok_or_else(|| LinkError::Task { details: "feed already joined".into() })?;
        task.await.map_err(|e| LinkError::Task { details: e.to_string() })
    }
}

impl Drop for ClassifierFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::prediction_channel;
    use std::time::Duration;

    fn samples(n: usize) -> impl Stream<Item = PredictionSample> + Send + 'static {
        futures::stream::iter((0..n).map(|i| PredictionSample::new(i as f64 * 0.01, i % 5)))
    }

    #[tokio::test]
    async fn native_rate_forwards_everything_then_sentinel() {
        let (tx, mut rx) = prediction_channel(64);
        let feed = ClassifierFeed::spawn(samples(10), tx, UpdateRate::Native, 100.0);
        assert_eq!(feed.join().await.unwrap(), 10);

        let drained = rx.try_drain();
        assert_eq!(drained.samples.len(), 10);
        assert!(drained.end_of_stream);
    }

    #[tokio::test(start_paused = true)]
    async fn limited_rate_keeps_latest() {
        let (tx, mut rx) = prediction_channel(64);
        let feed = ClassifierFeed::spawn(samples(10), tx, UpdateRate::Max(10), 100.0);
        assert_eq!(feed.join().await.unwrap(), 1);

        let drained = rx.try_drain();
        assert_eq!(drained.samples, vec![PredictionSample::new(9.0 * 0.01, 4)]);
        assert!(drained.end_of_stream);
    }

    #[tokio::test]
    async fn stop_sends_sentinel() {
        let (tx, mut rx) = prediction_channel(4);
        let feed = ClassifierFeed::spawn(futures::stream::pending::<PredictionSample>(), tx, UpdateRate::Native, 100.0);
        feed.stop();
        assert_eq!(feed.join().await.unwrap(), 0);
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).await.unwrap(),
            Some(crate::types::PredictionMessage::EndOfStream)
        );
    }
}

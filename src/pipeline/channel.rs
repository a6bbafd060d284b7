//! Bounded single-producer/single-consumer prediction channel.

use std::time::Duration;

use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::types::{PredictionMessage, PredictionSample};
use crate::{LinkError, Result};

/// Create a prediction channel holding up to `capacity` pending messages.
pub fn prediction_channel(capacity: usize) -> (PredictionSender, PredictionReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PredictionSender { tx }, PredictionReceiver { rx })
}

/// Producer half. Samples wait for capacity rather than being dropped.
#[derive(Debug, Clone)]
pub struct PredictionSender {
    tx: mpsc::Sender<PredictionMessage>,
}

impl PredictionSender {
    pub async fn send(&self, message: impl Into<PredictionMessage>) -> Result<()> {
        self.tx.send(message.into()).await.map_err(|_| closed())
    }

    /// Send from a thread outside the async runtime.
    pub fn send_blocking(&self, message: impl Into<PredictionMessage>) -> Result<()> {
        self.tx.blocking_send(message.into()).map_err(|_| closed())
    }

    /// Enqueue without waiting; a full queue is an error.
    pub fn try_send(&self, message: impl Into<PredictionMessage>) -> Result<()> {
        self.tx.try_send(message.into()).map_err(|e| match e {
            TrySendError::Full(_) => LinkError::Task { details: "prediction channel is full".into() },
            TrySendError::Closed(_) => closed(),
        })
    }

    /// Signal end of stream, waiting up to `timeout` for queue space.
    ///
    /// Other clones may keep the channel open, so the sentinel is the only
    /// reliable end marker. A consumer that is already gone counts as done.
    pub async fn finish(self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.tx.send(PredictionMessage::EndOfStream)).await {
            Ok(_) => Ok(()),
            Err(_) => Err(LinkError::Timeout { operation: "sending end of stream".into(), duration: timeout }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn closed() -> LinkError {
    LinkError::Task { details: "prediction channel closed".into() }
}

/// Everything pending on the channel at the time of a drain.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Drained {
    pub samples: Vec<PredictionSample>,
    /// Sentinel received, or every sender dropped.
    pub end_of_stream: bool,
}

impl Drained {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && !self.end_of_stream
    }
}

/// Consumer half, owned by the pipeline.
#[derive(Debug)]
pub struct PredictionReceiver {
    rx: mpsc::Receiver<PredictionMessage>,
}

impl PredictionReceiver {
    /// Take everything currently queued without waiting.
    ///
    /// Samples queued after the sentinel are left unread.
    pub fn try_drain(&mut self) -> Drained {
        let mut drained = Drained::default();
        loop {
            match self.rx.try_recv() {
                Ok(PredictionMessage::Sample(sample)) => drained.samples.push(sample),
                Ok(PredictionMessage::EndOfStream) | Err(TryRecvError::Disconnected) => {
                    drained.end_of_stream = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        drained
    }

    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` on timeout; a closed channel reads as end of stream.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<PredictionMessage>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Ok(Some(PredictionMessage::EndOfStream)),
            Err(_) => Ok(None),
        }
    }

    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_takes_everything_pending() {
        let (tx, mut rx) = prediction_channel(8);
        tx.send(PredictionSample::new(0.0, 1)).await.unwrap();
        tx.send(PredictionSample::new(0.1, 2)).await.unwrap();

        let drained = rx.try_drain();
        assert_eq!(drained.samples.len(), 2);
        assert!(!drained.end_of_stream);
        assert!(rx.try_drain().is_empty());
    }

    #[tokio::test]
    async fn sentinel_ends_the_stream() {
        let (tx, mut rx) = prediction_channel(8);
        tx.send(PredictionSample::new(0.0, 1)).await.unwrap();
        tx.send(PredictionMessage::EndOfStream).await.unwrap();
        tx.send(PredictionSample::new(0.2, 4)).await.unwrap();

        let drained = rx.try_drain();
        assert_eq!(drained.samples, vec![PredictionSample::new(0.0, 1)]);
        assert!(drained.end_of_stream);
    }

    #[tokio::test]
    async fn dropped_sender_reads_as_end_of_stream() {
        let (tx, mut rx) = prediction_channel(8);
        tx.try_send(PredictionSample::new(0.0, 0)).unwrap();
        drop(tx);

        let drained = rx.try_drain();
        assert_eq!(drained.samples.len(), 1);
        assert!(drained.end_of_stream);
    }

    #[tokio::test]
    async fn full_queue_rejects_try_send() {
        let (tx, _rx) = prediction_channel(1);
        tx.try_send(PredictionSample::new(0.0, 0)).unwrap();
        assert!(matches!(tx.try_send(PredictionSample::new(0.1, 0)), Err(LinkError::Task { .. })));
    }

    #[tokio::test]
    async fn recv_timeout_does_not_block_forever() {
        let (tx, mut rx) = prediction_channel(1);
        assert_eq!(rx.recv_timeout(Duration::from_millis(5)).await.unwrap(), None);

        tx.finish(Duration::from_millis(5)).await.unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(5)).await.unwrap(),
            Some(PredictionMessage::EndOfStream)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn finish_waits_for_queue_space() {
        let (tx, mut rx) = prediction_channel(1);
        let _other_producer = tx.clone();
        tx.send(PredictionSample::new(0.0, 1)).await.unwrap();

        let finishing = tokio::spawn(tx.finish(Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rx.try_drain().samples, vec![PredictionSample::new(0.0, 1)]);

        finishing.await.unwrap().unwrap();
        assert!(rx.try_drain().end_of_stream);
    }

    #[tokio::test(start_paused = true)]
    async fn finish_gives_up_on_a_stalled_consumer() {
        let (tx, _rx) = prediction_channel(1);
        tx.send(PredictionSample::new(0.0, 1)).await.unwrap();
        let err = tx.finish(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, LinkError::Timeout { .. }));
    }

    #[tokio::test]
    async fn finish_after_consumer_left_is_ok() {
        let (tx, rx) = prediction_channel(1);
        drop(rx);
        tx.finish(Duration::from_millis(5)).await.unwrap();
    }

    #[test]
    fn blocking_send_from_plain_thread() {
        let (tx, mut rx) = prediction_channel(4);
        std::thread::spawn(move || {
            tx.send_blocking(PredictionSample::new(1.0, 3)).unwrap();
            tx.send_blocking(PredictionMessage::EndOfStream).unwrap();
        })
        .join()
        .unwrap();

        let drained = rx.try_drain();
        assert_eq!(drained.samples, vec![PredictionSample::new(1.0, 3)]);
        assert!(drained.end_of_stream);
    }
}

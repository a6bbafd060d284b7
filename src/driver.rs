//! Driver spawns and manages the gesture pipeline task

use futures::Stream;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hand::HandInterface;
use crate::pipeline::{GesturePipeline, PipelineReport, PipelineState, PredictionReceiver};
use crate::types::GestureLabel;
use crate::{LinkError, Result};

/// Handle to a running pipeline task.
///
/// Dropping the handle cancels the task; use [`PipelineHandle::shutdown`] to
/// also wait for the hand to be disconnected.
pub struct PipelineHandle {
    state: watch::Receiver<PipelineState>,
    labels: watch::Receiver<Option<GestureLabel>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<PipelineReport>>,
}

impl PipelineHandle {
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receiver for state changes.
    pub fn state_changes(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Most recently dispatched gesture, `None` before the first and after stop.
    pub fn current_label(&self) -> Option<GestureLabel> {
        self.labels.borrow().clone()
    }

    /// Dispatched gestures for display.
    ///
    /// Latest-value semantics: a slow consumer sees only the newest label.
    /// Ends when the pipeline stops.
    pub fn label_updates(&self) -> impl Stream<Item = GestureLabel> + Send + 'static {
        WatchStream::new(self.labels.clone())
            .skip_while(|label| std::future::ready(label.is_none()))
            // None after the first label means the pipeline stopped
            .take_while(|label| std::future::ready(label.is_some()))
            .filter_map(|label| async move { label })
    }

    /// Token that stops the pipeline when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request a stop without waiting.
    pub fn stop(&self) {
        debug!("Pipeline stop requested");
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Wait for the pipeline to finish on its own.
    pub async fn join(mut self) -> Result<PipelineReport> {
        let task = self.task.take().ok_or_else(|| LinkError::Task { details: "pipeline already joined".into() })?;
        task.await.map_err(|e| LinkError::Task { details: e.to_string() })
    }

    /// Stop the pipeline and wait for it to disconnect the hand.
    pub async fn shutdown(self) -> Result<PipelineReport> {
        self.stop();
        self.join().await
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Driver spawns the pipeline consumer on the runtime.
pub struct Driver;

impl Driver {
    /// Spawn `pipeline` draining `receiver`.
    ///
    /// Returns immediately; the task connects the hand itself.
    pub fn spawn<H>(pipeline: GesturePipeline<H>, receiver: PredictionReceiver) -> PipelineHandle
    where
        H: HandInterface,
    {
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let (label_tx, label_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let cancel_task = cancel.clone();
        let task = tokio::spawn(async move {
            info!("Pipeline task started");
            pipeline.run(receiver, cancel_task, state_tx, label_tx).await
        });

        PipelineHandle { state: state_rx, labels: label_rx, cancel, task: Some(task) }
    }
}

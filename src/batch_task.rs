use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::BatchError;
use crate::organizer::{run_batch, BatchRequest, BatchResult, ProgressEvent};

/// A batch running off the caller's thread. There is no cancellation: once
/// spawned, the batch runs to completion.
pub struct BatchHandle {
    progress: mpsc::UnboundedReceiver<ProgressEvent>,
    completion: JoinHandle<Result<BatchResult, BatchError>>,
}

impl BatchHandle {
    /// Next progress notification, or `None` once the batch has stopped
    /// reporting.
    pub async fn next_progress(&mut self) -> Option<ProgressEvent> {
        self.progress.recv().await
    }

    /// Waits for the batch result. Progress events not yet read are dropped.
    pub async fn finish(self) -> Result<BatchResult, BatchError> {
        drop(self.progress);
        match self.completion.await {
            Ok(result) => result,
            Err(join_err) => Err(BatchError::TaskAborted {
                message: join_err.to_string(),
            }),
        }
    }

    /// Feeds every progress event to `on_progress`, then returns the result.
    pub async fn drive(mut self, mut on_progress: impl FnMut(ProgressEvent)) -> Result<BatchResult, BatchError> {
        while let Some(event) = self.next_progress().await {
            on_progress(event);
        }
        self.finish().await
    }
}

/// Starts `request` on tokio's blocking pool. Must be called from within a
/// tokio runtime.
pub fn spawn_batch(request: BatchRequest) -> BatchHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let completion = tokio::task::spawn_blocking(move || {
        run_batch(&request, |event| {
            // Notifications are best-effort; a caller that stopped listening
            // does not stop the batch.
            if tx.send(event).is_err() {
                warn!("progress receiver dropped");
            }
        })
    });
    BatchHandle {
        progress: rx,
        completion,
    }
}

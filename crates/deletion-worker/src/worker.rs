use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::backend::DeletionBackend;

/// How long the worker keeps draining already-queued deletions after
/// shutdown is requested before it gives up on the rest (spec §4.7).
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

enum DeletionRequest {
    Delete(String),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deletion worker has shut down")]
pub struct DeletionWorkerClosed;

/// A cloneable handle producers use to enqueue chat ids for cascade
/// deletion. Cheap to clone; every clone feeds the same FIFO.
#[derive(Clone)]
pub struct DeletionHandle {
    sender: mpsc::UnboundedSender<DeletionRequest>,
}

impl DeletionHandle {
    pub fn enqueue(&self, chat_id: impl Into<String>) -> Result<(), DeletionWorkerClosed> {
        self.sender.send(DeletionRequest::Delete(chat_id.into())).map_err(|_| DeletionWorkerClosed)
    }
}

/// Owns the single-consumer background task (spec §4.7). Dropping it
/// requests shutdown but does not block; call [`DeletionWorker::shutdown`]
/// to await the soft-deadline drain.
pub struct DeletionWorker {
    handle: DeletionHandle,
    task: Option<JoinHandle<()>>,
}

impl DeletionWorker {
    #[must_use]
    pub fn spawn(backend: Arc<dyn DeletionBackend>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(receiver, backend));
        Self { handle: DeletionHandle { sender }, task: Some(task) }
    }

    #[must_use]
    pub fn handle(&self) -> DeletionHandle {
        self.handle.clone()
    }

    /// Requests shutdown and awaits the worker's drain loop.
    pub async fn shutdown(mut self) {
        let _ = self.handle.sender.send(DeletionRequest::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for DeletionWorker {
    fn drop(&mut self) {
        let _ = self.handle.sender.send(DeletionRequest::Shutdown);
    }
}

async fn run(mut receiver: mpsc::UnboundedReceiver<DeletionRequest>, backend: Arc<dyn DeletionBackend>) {
    loop {
        match receiver.recv().await {
            Some(DeletionRequest::Delete(chat_id)) => cascade_delete(backend.as_ref(), &chat_id).await,
            Some(DeletionRequest::Shutdown) | None => break,
        }
    }

    // Drains whatever is already buffered, bounded by a soft wall-clock
    // deadline; never waits on new arrivals once shutdown has started.
    let deadline = Instant::now() + SHUTDOWN_DRAIN;
    loop {
        if Instant::now() >= deadline {
            let mut dropped = 0u32;
            while receiver.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                tracing::warn!(dropped, "deletion worker shutdown deadline exceeded, canceling remaining work");
            }
            break;
        }

        match receiver.try_recv() {
            Ok(DeletionRequest::Delete(chat_id)) => cascade_delete(backend.as_ref(), &chat_id).await,
            Ok(DeletionRequest::Shutdown) => continue,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
}

/// Deletes a chat's image objects, its dialog log file, and its metadata
/// rows in `chat_images -> chat_messages -> chats` order. Every step's
/// failure is logged and does not abort the remaining steps (spec §4.7).
async fn cascade_delete(backend: &dyn DeletionBackend, chat_id: &str) {
    match backend.list_chat_images(chat_id).await {
        Ok(images) => {
            for image in images {
                if let Err(err) = backend.delete_object(&image.object_key).await {
                    tracing::warn!(chat_id, object_key = %image.object_key, %err, "failed to delete image object, continuing cascade");
                }
            }
        }
        Err(err) => tracing::warn!(chat_id, %err, "failed to list chat images, skipping object cleanup"),
    }

    if let Err(err) = backend.delete_chat_log(chat_id).await {
        tracing::warn!(chat_id, %err, "failed to delete chat log file");
    }
    if let Err(err) = backend.delete_chat_images_rows(chat_id).await {
        tracing::warn!(chat_id, %err, "failed to delete chat_images rows");
    }
    if let Err(err) = backend.delete_chat_messages_rows(chat_id).await {
        tracing::warn!(chat_id, %err, "failed to delete chat_messages rows");
    }
    if let Err(err) = backend.delete_chat_row(chat_id).await {
        tracing::warn!(chat_id, %err, "failed to delete chats row");
    }
}

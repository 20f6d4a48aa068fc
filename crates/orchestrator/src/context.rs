//! Per-request context (spec §4.1.1): everything the pipeline needs to know
//! about one admitted user message, plus a cooperative cancellation signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use doc_agent_common::Profile;
use tokio::sync::Notify;
use uuid::Uuid;

/// Home-grown cancellation signal (no `tokio_util`, matching the reference
/// backend's preference for explicit state over an external crate): a
/// cloneable flag a client-disconnect handler can set, and a `Notify` the
/// pipeline can await alongside its own work to abort at the next
/// suspension point.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called, for use in a `select!`
    /// alongside the pipeline's own suspension points.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one call to [`crate::Orchestrator::handle_message`] needs
/// (spec §4.1.1). `profile` is an explicit field set by the caller rather
/// than inferred inside the orchestrator (see Open Question decision 4 in
/// `DESIGN.md`).
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub chat_id: Uuid,
    pub user_id: Uuid,
    pub user_message: String,
    pub document_ids: Vec<Uuid>,
    pub profile: Profile,
    pub cancellation: CancellationToken,
}

//! Pipeline Orchestrator (spec §4.1): the top-level entry point that admits
//! a request onto the request queue, runs the nine-stage pipeline against
//! it, and hands the caller a `Stream` of ordered, timestamped events.

pub mod context;
pub mod deletion_backend;
pub mod error;
pub mod materials_storage;
pub mod pipeline;
pub mod prompts;

use std::sync::Arc;

use doc_agent_common::TimestampedEvent;
use doc_agent_event_bus::EventConsumer;
use doc_agent_request_queue::{execute_with_queue, RequestQueue, RequestQueueConfig};
use futures::stream::Stream;

pub use context::{CancellationToken, RequestContext};
pub use error::{OrchestratorError, OrchestratorResult};
pub use pipeline::PipelineDeps;

/// Owns the request queue and pipeline dependencies; one instance per
/// process, shared across every incoming request.
pub struct Orchestrator {
    deps: Arc<PipelineDeps>,
    queue: Arc<RequestQueue>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(deps: Arc<PipelineDeps>, queue_config: &RequestQueueConfig) -> Self {
        Self { deps, queue: Arc::new(RequestQueue::new(queue_config.clone())) }
    }

    /// Admits `ctx` onto the queue and returns a stream of every event the
    /// request produces, starting with `queue_position` updates (if the
    /// request has to wait) and ending with `completed` or `error`.
    pub fn handle_message(&self, ctx: RequestContext) -> impl Stream<Item = TimestampedEvent> {
        let deps = Arc::clone(&self.deps);
        let request_id = ctx.request_id.clone();
        let consumer: EventConsumer = execute_with_queue(Arc::clone(&self.queue), request_id, move |producer| async move {
            pipeline::run(deps, ctx, producer).await;
        });
        consumer_into_stream(consumer)
    }
}

fn consumer_into_stream(consumer: EventConsumer) -> impl Stream<Item = TimestampedEvent> {
    futures::stream::unfold(consumer, |mut consumer| async move { consumer.recv().await.map(|event| (event, consumer)) })
}

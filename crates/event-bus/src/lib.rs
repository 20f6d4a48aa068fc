//! Event Bus (spec §4.8): typed, ordered, per-request, single-consumer
//! event channel. Backed by a bounded `tokio::sync::mpsc` channel so a
//! stalled consumer applies backpressure instead of letting a producer
//! buffer unboundedly (spec §5).

use doc_agent_common::{StreamEvent, TimestampedEvent};
use tokio::sync::mpsc;

/// Default channel capacity: `queue.max_concurrent * 64` at the call site;
/// exposed here only as the fallback for callers that don't thread a
/// configured value through.
pub const DEFAULT_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event bus consumer has disconnected")]
pub struct EventBusClosed;

/// The producer half. Cloneable so multiple pipeline stages can emit onto
/// the same per-request stream; the underlying channel still totally
/// orders whatever is actually sent through it.
#[derive(Clone)]
pub struct EventProducer {
    sender: mpsc::Sender<TimestampedEvent>,
}

impl EventProducer {
    /// Emits `event` with the current UTC timestamp. Returns
    /// [`EventBusClosed`] once the consumer has gone away so the caller can
    /// abort cooperatively at its next suspension point, per spec §5.
    pub async fn emit(&self, event: StreamEvent) -> Result<(), EventBusClosed> {
        self.sender.send(TimestampedEvent::now(event)).await.map_err(|_| EventBusClosed)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The single-consumer half.
pub struct EventConsumer {
    receiver: mpsc::Receiver<TimestampedEvent>,
}

impl EventConsumer {
    /// Awaits the next event, or `None` once every producer has dropped.
    pub async fn recv(&mut self) -> Option<TimestampedEvent> {
        self.receiver.recv().await
    }

    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Creates a bound producer/consumer pair for one request's event stream.
#[must_use]
pub fn channel(capacity: usize) -> (EventProducer, EventConsumer) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (EventProducer { sender }, EventConsumer { receiver })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_received_in_send_order() {
        let (tx, mut rx) = channel(DEFAULT_CAPACITY);
        tx.emit(StreamEvent::PhaseStarted { phase: "intent".to_string() }).await.unwrap();
        tx.emit(StreamEvent::PhaseStarted { phase: "extract".to_string() }).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first.event, StreamEvent::PhaseStarted { ref phase } if phase == "intent"));
        assert!(matches!(second.event, StreamEvent::PhaseStarted { ref phase } if phase == "extract"));
    }

    #[tokio::test]
    async fn emit_fails_after_consumer_drops() {
        let (tx, rx) = channel(4);
        drop(rx);
        let result = tx.emit(StreamEvent::Completed).await;
        assert_eq!(result, Err(EventBusClosed));
    }

    #[tokio::test]
    async fn consumer_sees_none_after_all_producers_drop() {
        let (tx, mut rx) = channel(4);
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn clone_producers_share_one_ordered_stream() {
        let (tx, mut rx) = channel(4);
        let tx2 = tx.clone();
        tx.emit(StreamEvent::ProcessingStarted { request_id: "r1".to_string() }).await.unwrap();
        tx2.emit(StreamEvent::Completed).await.unwrap();
        drop(tx);
        drop(tx2);

        assert!(matches!(rx.recv().await.unwrap().event, StreamEvent::ProcessingStarted { .. }));
        assert!(matches!(rx.recv().await.unwrap().event, StreamEvent::Completed));
        assert!(rx.recv().await.is_none());
    }
}

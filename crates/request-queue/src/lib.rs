//! Request Queue (spec §4.6): a process-wide admission gate with a
//! counting semaphore, a FIFO waiting list, and an EMA wait-time estimator.
//! Mirrors the teacher's `Orchestrator { graphs: Arc<RwLock<...>> }`
//! single-mutex-owns-all-state shape: one small struct behind one lock
//! owns every piece of queue state.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use doc_agent_common::config::QueueConfig;
use doc_agent_common::StreamEvent;
use doc_agent_event_bus::{channel, EventConsumer, EventProducer, DEFAULT_CAPACITY};
use tokio::sync::Semaphore;

const TICK_INTERVAL: Duration = Duration::from_secs(2);
/// Smoothing factor for the processing-time EMA; weights the most recent
/// completion at 30% against the running mean.
const EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

#[derive(Debug, Clone, Copy)]
pub struct RequestQueueConfig {
    pub max_concurrent: usize,
    pub max_size: usize,
    pub timeout_seconds: u64,
}

impl From<&QueueConfig> for RequestQueueConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_size: config.max_size,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

struct QueueState {
    waiting_order: VecDeque<u64>,
    active_ids: HashSet<u64>,
    next_id: u64,
    ema_processing_seconds: f64,
}

pub struct RequestQueue {
    semaphore: Arc<Semaphore>,
    state: Mutex<QueueState>,
    config: RequestQueueConfig,
}

impl RequestQueue {
    #[must_use]
    pub fn new(config: RequestQueueConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            state: Mutex::new(QueueState {
                waiting_order: VecDeque::new(),
                active_ids: HashSet::new(),
                next_id: 0,
                ema_processing_seconds: 0.0,
            }),
            config,
        }
    }

    /// Admits `id` to the waiting list, or fails fast when the waiting set
    /// is already at capacity.
    fn enqueue(&self) -> Result<u64, QueueFull> {
        let mut state = self.state.lock().expect("request queue mutex poisoned");
        if state.waiting_order.len() >= self.config.max_size {
            return Err(QueueFull);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.waiting_order.push_back(id);
        Ok(id)
    }

    fn position_of(&self, id: u64) -> usize {
        let state = self.state.lock().expect("request queue mutex poisoned");
        state.waiting_order.iter().position(|&waiting_id| waiting_id == id).map_or(0, |idx| idx + 1)
    }

    fn queue_size(&self) -> usize {
        self.state.lock().expect("request queue mutex poisoned").waiting_order.len()
    }

    fn active_requests(&self) -> usize {
        self.state.lock().expect("request queue mutex poisoned").active_ids.len()
    }

    fn estimated_wait_seconds(&self, position: usize) -> f64 {
        let state = self.state.lock().expect("request queue mutex poisoned");
        position as f64 * state.ema_processing_seconds
    }

    fn remove_waiting(&self, id: u64) {
        let mut state = self.state.lock().expect("request queue mutex poisoned");
        state.waiting_order.retain(|&waiting_id| waiting_id != id);
    }

    fn promote_to_active(&self, id: u64) {
        let mut state = self.state.lock().expect("request queue mutex poisoned");
        state.waiting_order.retain(|&waiting_id| waiting_id != id);
        state.active_ids.insert(id);
    }

    fn finish_active(&self, id: u64, elapsed_seconds: f64) {
        let mut state = self.state.lock().expect("request queue mutex poisoned");
        state.active_ids.remove(&id);
        state.ema_processing_seconds = if state.ema_processing_seconds == 0.0 {
            elapsed_seconds
        } else {
            EMA_ALPHA * elapsed_seconds + (1.0 - EMA_ALPHA) * state.ema_processing_seconds
        };
    }
}

/// Runs `producer` under queue admission control, returning a consumer the
/// caller can stream immediately: `queue_position` events while waiting,
/// then `processing_started`, then whatever `producer` emits through its
/// `EventProducer`, verbatim. The admission slot is released on every exit
/// path because it is held as an RAII permit.
pub fn execute_with_queue<F, Fut>(queue: Arc<RequestQueue>, request_id: String, producer: F) -> EventConsumer
where
    F: FnOnce(EventProducer) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = channel(DEFAULT_CAPACITY);

    tokio::spawn(async move {
        let id = match queue.enqueue() {
            Ok(id) => id,
            Err(QueueFull) => {
                tracing::warn!(request_id = %request_id, "request queue full, rejecting");
                let _ = tx
                    .emit(StreamEvent::Error { code: "queue_full".to_string(), message: "the request queue is full".to_string() })
                    .await;
                return;
            }
        };

        let deadline = Instant::now() + Duration::from_secs(queue.config.timeout_seconds);
        let permit = loop {
            if Instant::now() >= deadline {
                queue.remove_waiting(id);
                tracing::warn!(request_id = %request_id, "request timed out waiting in queue");
                let _ = tx
                    .emit(StreamEvent::Error {
                        code: "queue_timeout".to_string(),
                        message: "timed out waiting for an available processing slot".to_string(),
                    })
                    .await;
                return;
            }

            let position = queue.position_of(id);
            let estimated_wait_seconds = queue.estimated_wait_seconds(position);
            if tx
                .emit(StreamEvent::QueuePosition {
                    position,
                    estimated_wait_seconds,
                    active_requests: queue.active_requests(),
                    queue_size: queue.queue_size(),
                })
                .await
                .is_err()
            {
                queue.remove_waiting(id);
                return;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let tick = TICK_INTERVAL.min(remaining);
            match tokio::time::timeout(tick, Arc::clone(&queue.semaphore).acquire_owned()).await {
                Ok(Ok(permit)) => break permit,
                Ok(Err(_)) => {
                    queue.remove_waiting(id);
                    tracing::warn!(request_id = %request_id, "request queue semaphore closed");
                    let _ = tx
                        .emit(StreamEvent::Error { code: "queue_closed".to_string(), message: "the request queue is shutting down".to_string() })
                        .await;
                    return;
                }
                Err(_) => continue,
            }
        };

        queue.promote_to_active(id);
        if tx.emit(StreamEvent::ProcessingStarted { request_id }).await.is_err() {
            queue.finish_active(id, 0.0);
            drop(permit);
            return;
        }

        let started = Instant::now();
        producer(tx.clone()).await;
        let elapsed_seconds = started.elapsed().as_secs_f64();

        queue.finish_active(id, elapsed_seconds);
        drop(permit);
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_agent_common::TimestampedEvent;
    use tokio::time::{sleep, Duration as StdDuration};

    fn config(max_concurrent: usize, max_size: usize, timeout_seconds: u64) -> RequestQueueConfig {
        RequestQueueConfig { max_concurrent, max_size, timeout_seconds }
    }

    async fn drain(rx: &mut EventConsumer) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(TimestampedEvent { event, .. }) = rx.recv().await {
            let terminal = matches!(event, StreamEvent::Completed | StreamEvent::Error { .. });
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn admits_immediately_when_under_capacity() {
        let queue = Arc::new(RequestQueue::new(config(2, 50, 300)));
        let mut rx = execute_with_queue(Arc::clone(&queue), "r1".to_string(), |tx| async move {
            let _ = tx.emit(StreamEvent::Completed).await;
        });

        let events = drain(&mut rx).await;
        assert!(matches!(events.first(), Some(StreamEvent::ProcessingStarted { .. })));
        assert!(matches!(events.last(), Some(StreamEvent::Completed)));
    }

    #[tokio::test]
    async fn waiting_list_overflow_yields_queue_full() {
        let queue = Arc::new(RequestQueue::new(config(1, 2, 300)));
        // Fill both concurrency and the 2-slot waiting list with requests
        // that never complete on their own.
        let (hold_tx, hold_rx) = tokio::sync::oneshot::channel::<()>();
        let hold_rx = Arc::new(Mutex::new(Some(hold_rx)));

        let _active = execute_with_queue(Arc::clone(&queue), "active".to_string(), move |_tx| async move {
            let _ = hold_rx.lock().unwrap().take().unwrap().await;
        });
        sleep(StdDuration::from_millis(20)).await;

        let _waiter_a = execute_with_queue(Arc::clone(&queue), "a".to_string(), |_tx| async move {});
        let _waiter_b = execute_with_queue(Arc::clone(&queue), "b".to_string(), |_tx| async move {});
        sleep(StdDuration::from_millis(20)).await;

        let mut overflow = execute_with_queue(Arc::clone(&queue), "overflow".to_string(), |_tx| async move {});
        let events = drain(&mut overflow).await;
        assert!(matches!(events.first(), Some(StreamEvent::Error { code, .. }) if code == "queue_full"));

        let _ = hold_tx.send(());
    }

    #[tokio::test]
    async fn third_request_while_two_active_waits_at_position_one() {
        let queue = Arc::new(RequestQueue::new(config(2, 50, 300)));
        let (hold_a_tx, hold_a_rx) = tokio::sync::oneshot::channel::<()>();
        let (hold_b_tx, hold_b_rx) = tokio::sync::oneshot::channel::<()>();

        let _a = execute_with_queue(Arc::clone(&queue), "a".to_string(), move |_tx| async move {
            let _ = hold_a_rx.await;
        });
        let _b = execute_with_queue(Arc::clone(&queue), "b".to_string(), move |_tx| async move {
            let _ = hold_b_rx.await;
        });
        sleep(StdDuration::from_millis(20)).await;

        let mut third = execute_with_queue(Arc::clone(&queue), "c".to_string(), |_tx| async move {});
        let first_event = third.recv().await.unwrap();
        assert!(matches!(first_event.event, StreamEvent::QueuePosition { position: 1, .. }));

        let _ = hold_a_tx.send(());
        let _ = hold_b_tx.send(());
    }
}

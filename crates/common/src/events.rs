//! Typed stream events emitted by the Event Bus (spec §4.8, §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::block::BlockId;
use crate::materials::ImageKind;

/// Which analysis profile a request runs under (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Simple,
    Complex,
    Compare,
}

/// One event in a request's ordered stream. Every variant's payload is what
/// goes on the wire as the SSE `data:` field; the enum's tag is the SSE
/// `event:` name (spec §6, wire-level two-line framing owned by the transport).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    PhaseStarted { phase: String },
    PhaseProgress { phase: String, detail: String },
    LlmToken { accumulated: String, delta: String },
    LlmThinking { delta: String },
    LlmFinal { content: String, model: String },
    ToolCall { name: String, arguments: serde_json::Value },
    ImageReady { block_id: BlockId, kind: ImageKind, bbox: Option<BoundingBox> },
    QueuePosition {
        position: usize,
        estimated_wait_seconds: f64,
        active_requests: usize,
        queue_size: usize,
    },
    ProcessingStarted { request_id: String },
    Error { code: String, message: String },
    Completed,
}

/// An event paired with the UTC timestamp it was emitted at (spec §4.8:
/// "every event carries a UTC timestamp").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StreamEvent,
}

impl TimestampedEvent {
    #[must_use]
    pub fn now(event: StreamEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.event, StreamEvent::Completed | StreamEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_and_error_are_terminal() {
        assert!(TimestampedEvent::now(StreamEvent::Completed).is_terminal());
        assert!(TimestampedEvent::now(StreamEvent::Error {
            code: "unknown".into(),
            message: "boom".into()
        })
        .is_terminal());
        assert!(!TimestampedEvent::now(StreamEvent::PhaseStarted {
            phase: "processing".into()
        })
        .is_terminal());
    }

    #[test]
    fn serializes_with_tagged_event_name() {
        let event = StreamEvent::ProcessingStarted {
            request_id: "r1".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "processing_started");
        assert_eq!(json["data"]["request_id"], "r1");
    }
}

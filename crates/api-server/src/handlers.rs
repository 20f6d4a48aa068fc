//! HTTP handlers: thin translation between axum and the orchestrator/storage
//! seams (spec §6). No pipeline logic lives here.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use doc_agent_common::TimestampedEvent;
use doc_agent_orchestrator::{CancellationToken, RequestContext};
use doc_agent_storage::MetadataStore;
use futures::StreamExt;
use tracing::{error, info};
use uuid::Uuid;

use crate::types::{ChatCreatedResponse, CreateChatRequest, HealthResponse, SendMessageRequest};
use crate::ApiState;

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string() })
}

pub async fn create_chat(State(state): State<ApiState>, Json(request): Json<CreateChatRequest>) -> Result<impl IntoResponse, (StatusCode, String)> {
    let chat = state.metadata_store.create_chat(request.user_id, &request.title).await.map_err(|err| {
        error!(%err, "failed to create chat");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to create chat".to_string())
    })?;

    Ok((StatusCode::CREATED, Json(ChatCreatedResponse { chat_id: chat.id })))
}

/// `POST /api/v1/chats/{chat_id}/messages`: admits the message onto the
/// pipeline's request queue and streams back every event it produces as SSE
/// (spec §6 wire framing: `event: <name>` then `data: <json>`).
pub async fn send_message(State(state): State<ApiState>, Path(chat_id): Path<Uuid>, Json(request): Json<SendMessageRequest>) -> impl IntoResponse {
    let request_id = Uuid::new_v4().to_string();
    info!(request_id, %chat_id, user_id = %request.user_id, "admitting message onto pipeline");

    let ctx = RequestContext {
        request_id,
        chat_id,
        user_id: request.user_id,
        user_message: request.message,
        document_ids: request.document_ids,
        profile: request.profile,
        cancellation: CancellationToken::new(),
    };

    let events = state.orchestrator.handle_message(ctx);
    Sse::new(events.map(to_sse_event)).keep_alive(KeepAlive::default())
}

pub async fn delete_chat(State(state): State<ApiState>, Path(chat_id): Path<Uuid>) -> Result<impl IntoResponse, (StatusCode, String)> {
    state.deletion_handle.enqueue(chat_id.to_string()).map_err(|_| (StatusCode::SERVICE_UNAVAILABLE, "deletion worker has shut down".to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

/// Frames one pipeline event as SSE (spec §6): the `StreamEvent`'s adjacent
/// tag becomes the SSE event name, its content the `data:` payload verbatim.
/// Falls back to a generic `message` event if the shape is ever unexpected,
/// since a transport-level serialization failure must never abort the stream.
fn to_sse_event(event: TimestampedEvent) -> Result<SseEvent, Infallible> {
    let value = serde_json::to_value(&event.event).unwrap_or_else(|_| serde_json::json!({"event": "error", "data": {"code": "unknown", "message": "failed to serialize event"}}));
    let name = value.get("event").and_then(serde_json::Value::as_str).unwrap_or("message").to_string();
    let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
    Ok(SseEvent::default().event(name).data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_agent_common::StreamEvent;

    #[test]
    fn completed_event_has_no_data_payload() {
        let event = to_sse_event(TimestampedEvent::now(StreamEvent::Completed)).unwrap();
        let rendered = format!("{event:?}");
        assert!(rendered.contains("completed"));
    }

    #[test]
    fn error_event_carries_code_and_message() {
        let event = TimestampedEvent::now(StreamEvent::Error { code: "queue_full".to_string(), message: "no room".to_string() });
        let value = serde_json::to_value(&event.event).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["data"]["code"], "queue_full");
    }
}

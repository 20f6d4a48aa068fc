//! An in-memory [`LlmClient`] for tests: scripted structured responses and
//! a scripted streaming chunk sequence, avoiding a live HTTP dependency.

use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;

use crate::client::{ChunkStream, LlmClient};
use crate::error::{LlmError, LlmResult};
use crate::types::{GenerationParams, StreamChunk, UploadedFile};

#[derive(Default)]
pub struct FakeLlmClient {
    structured_responses: Mutex<Vec<String>>,
    streaming_chunks: Mutex<Vec<Vec<StreamChunk>>>,
}

impl FakeLlmClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next `call_structured` response (FIFO).
    pub fn push_structured_response(&self, raw_json: impl Into<String>) {
        self.structured_responses.lock().expect("fake llm client mutex poisoned").push(raw_json.into());
    }

    /// Queues the next `call_streaming` chunk sequence (FIFO).
    pub fn push_streaming_response(&self, chunks: Vec<StreamChunk>) {
        self.streaming_chunks.lock().expect("fake llm client mutex poisoned").push(chunks);
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn call_structured(
        &self,
        _model: &str,
        _system_prompt: &str,
        _user_content: &str,
        _files: &[UploadedFile],
        _schema: &serde_json::Value,
        _params: &GenerationParams,
    ) -> LlmResult<String> {
        let mut queue = self.structured_responses.lock().expect("fake llm client mutex poisoned");
        if queue.is_empty() {
            return Err(LlmError::Provider("fake llm client has no queued structured response".to_string()));
        }
        Ok(queue.remove(0))
    }

    async fn call_streaming(
        &self,
        _model: &str,
        _system_prompt: &str,
        _user_content: &str,
        _files: &[UploadedFile],
        _params: &GenerationParams,
    ) -> LlmResult<ChunkStream> {
        let mut queue = self.streaming_chunks.lock().expect("fake llm client mutex poisoned");
        if queue.is_empty() {
            return Err(LlmError::Provider("fake llm client has no queued streaming response".to_string()));
        }
        let chunks = queue.remove(0).into_iter().map(Ok).collect::<Vec<_>>();
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_agent_common::config::MediaResolution;
    use futures::StreamExt;

    fn params() -> GenerationParams {
        GenerationParams {
            temperature: 0.2,
            top_p: 0.95,
            max_output_tokens: 8192,
            thinking_budget: 0,
            media_resolution: MediaResolution::Medium,
        }
    }

    #[tokio::test]
    async fn replays_queued_structured_responses_in_order() {
        let client = FakeLlmClient::new();
        client.push_structured_response(r#"{"a":1}"#);
        client.push_structured_response(r#"{"a":2}"#);

        let schema = serde_json::json!({});
        let first = client.call_structured("flash", "sys", "hi", &[], &schema, &params()).await.unwrap();
        let second = client.call_structured("flash", "sys", "hi", &[], &schema, &params()).await.unwrap();
        assert_eq!(first, r#"{"a":1}"#);
        assert_eq!(second, r#"{"a":2}"#);
    }

    #[tokio::test]
    async fn streams_queued_chunks_then_done() {
        let client = FakeLlmClient::new();
        client.push_streaming_response(vec![
            StreamChunk::Text("hel".to_string()),
            StreamChunk::Text("lo".to_string()),
            StreamChunk::Done { full_content: "hello".to_string(), model: "flash".to_string() },
        ]);

        let mut stream = client.call_streaming("flash", "sys", "hi", &[], &params()).await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.push(chunk.unwrap());
        }
        assert_eq!(collected.len(), 3);
        assert!(matches!(collected.last(), Some(StreamChunk::Done { .. })));
    }
}

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::warn;

use crate::client::{ChunkStream, LlmClient};
use crate::error::{LlmError, LlmResult};
use crate::types::{GenerationParams, StreamChunk, UploadedFile};

/// Talks to an HTTP LLM provider over `reqwest`. Streaming responses are
/// expected as newline-delimited JSON chunks tagged `{"type": "thinking" |
/// "text" | "done", ...}`.
pub struct ReqwestLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ReqwestLlmClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into(), api_key: api_key.into() }
    }

    fn request_body(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        files: &[UploadedFile],
        params: &GenerationParams,
        schema: Option<&serde_json::Value>,
        stream: bool,
    ) -> serde_json::Value {
        json!({
            "model": model,
            "system_prompt": system_prompt,
            "user_content": user_content,
            "files": files,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_output_tokens": params.max_output_tokens,
            "thinking_budget": params.thinking_budget,
            "media_resolution": media_resolution_str(params),
            "response_schema": schema,
            "stream": stream,
        })
    }
}

fn media_resolution_str(params: &GenerationParams) -> &'static str {
    use doc_agent_common::config::MediaResolution;
    match params.media_resolution {
        MediaResolution::Low => "low",
        MediaResolution::Medium => "medium",
        MediaResolution::High => "high",
    }
}

#[async_trait]
impl LlmClient for ReqwestLlmClient {
    async fn call_structured(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        files: &[UploadedFile],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<String> {
        let body = self.request_body(model, system_prompt, user_content, files, params, Some(schema), false);
        let response = self
            .http
            .post(format!("{}/generate", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: serde_json::Value = response.json().await?;
        parsed
            .get("text")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LlmError::Provider("response missing 'text' field".to_string()))
    }

    async fn call_streaming(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        files: &[UploadedFile],
        params: &GenerationParams,
    ) -> LlmResult<ChunkStream> {
        let body = self.request_body(model, system_prompt, user_content, files, params, None, true);
        let response = self
            .http
            .post(format!("{}/generate", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        // Network chunk boundaries don't line up with NDJSON line boundaries, so a
        // partial line from one chunk is carried over and prefixed onto the next
        // rather than parsed (and dropped) independently.
        let byte_stream = Box::pin(response.bytes_stream());
        let initial = (byte_stream, String::new(), VecDeque::<LlmResult<StreamChunk>>::new(), false);
        let chunk_stream = futures::stream::unfold(initial, |(mut inner, mut buffer, mut pending, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (inner, buffer, pending, finished)));
                }
                if finished {
                    return None;
                }

                match inner.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(idx) = buffer.find('\n') {
                            let line = buffer[..idx].to_string();
                            buffer.drain(..=idx);
                            if !line.trim().is_empty() {
                                if let Some(parsed) = parse_stream_line(&line) {
                                    pending.push_back(parsed);
                                }
                            }
                        }
                    }
                    Some(Err(err)) => {
                        finished = true;
                        pending.push_back(Err(LlmError::Transport(err)));
                    }
                    None => {
                        finished = true;
                        let remainder = std::mem::take(&mut buffer);
                        if !remainder.trim().is_empty() {
                            if let Some(parsed) = parse_stream_line(&remainder) {
                                pending.push_back(parsed);
                            }
                        }
                    }
                }
            }
        });

        Ok(Box::pin(chunk_stream))
    }
}

fn parse_stream_line(line: &str) -> Option<LlmResult<StreamChunk>> {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            warn!(line, %err, "skipping malformed streaming line");
            return None;
        }
    };

    let kind = value.get("type").and_then(serde_json::Value::as_str)?;
    match kind {
        "thinking" => Some(Ok(StreamChunk::Thinking(text_field(&value)))),
        "text" => Some(Ok(StreamChunk::Text(text_field(&value)))),
        "done" => Some(Ok(StreamChunk::Done {
            full_content: text_field(&value),
            model: value.get("model").and_then(serde_json::Value::as_str).unwrap_or_default().to_string(),
        })),
        other => {
            warn!(kind = other, "unknown streaming chunk type");
            None
        }
    }
}

fn text_field(value: &serde_json::Value) -> String {
    value.get("text").and_then(serde_json::Value::as_str).unwrap_or_default().to_string()
}

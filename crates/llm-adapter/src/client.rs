use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::LlmResult;
use crate::types::{GenerationParams, StreamChunk, UploadedFile};

pub type ChunkStream = Pin<Box<dyn Stream<Item = LlmResult<StreamChunk>> + Send>>;

/// The seam between orchestration logic and a concrete LLM provider,
/// modeled on the reference backend's `ObjectStorage`/`PdfBackend`
/// trait-with-fake-impl pattern so call sites never depend on a concrete
/// HTTP client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A structured call: the model is constrained to `schema` and must
    /// return a single JSON object matching it. Returns the raw response
    /// text; callers run it through [`crate::parsing::parse_tolerant`].
    async fn call_structured(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        files: &[UploadedFile],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<String>;

    /// A streaming call yielding `thinking`/`text` chunks followed by one
    /// terminal `done` chunk.
    async fn call_streaming(
        &self,
        model: &str,
        system_prompt: &str,
        user_content: &str,
        files: &[UploadedFile],
        params: &GenerationParams,
    ) -> LlmResult<ChunkStream>;
}

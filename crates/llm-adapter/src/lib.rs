//! LLM Adapter (spec §4.5): structured and streaming calls behind one
//! provider-agnostic trait, plus the tolerant JSON recovery the orchestrator
//! needs when a provider doesn't return pure JSON.

pub mod client;
pub mod error;
pub mod fake;
pub mod parsing;
pub mod reqwest_client;
pub mod types;

pub use client::{ChunkStream, LlmClient};
pub use error::{LlmError, LlmResult};
pub use fake::FakeLlmClient;
pub use parsing::{extract_partial_answer_markdown, parse_tolerant};
pub use reqwest_client::ReqwestLlmClient;
pub use types::{GenerationParams, StreamChunk, UploadedFile};

use doc_agent_common::{Classify, ErrorCategory};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm returned a response that did not satisfy the requested schema: {0}")]
    SchemaViolation(String),
    #[error("llm response was not valid JSON even after tolerant recovery: {0}")]
    UnparsableResponse(String),
    #[error("llm provider returned an error: {0}")]
    Provider(String),
}

impl Classify for LlmError {
    fn category(&self) -> ErrorCategory {
        match self {
            LlmError::Transport(_) | LlmError::Provider(_) => ErrorCategory::TransientExternal,
            LlmError::SchemaViolation(_) | LlmError::UnparsableResponse(_) => ErrorCategory::LlmSchemaViolation,
        }
    }
}

pub type LlmResult<T> = Result<T, LlmError>;

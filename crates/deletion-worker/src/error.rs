use doc_agent_common::error::{Classify, ErrorCategory};

#[derive(Debug, thiserror::Error)]
pub enum DeletionError {
    #[error("backend operation failed: {0}")]
    Backend(String),
}

impl Classify for DeletionError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::TransientExternal
    }
}

pub type DeletionResult<T> = Result<T, DeletionError>;

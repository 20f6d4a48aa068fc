use doc_agent_common::error::{Classify, ErrorCategory};

#[derive(Debug, thiserror::Error)]
pub enum DialogLogError {
    #[error("dialog log io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for DialogLogError {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::CacheIoError
    }
}

pub type DialogLogResult<T> = Result<T, DialogLogError>;

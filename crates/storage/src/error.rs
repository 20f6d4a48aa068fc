use doc_agent_common::error::{Classify, ErrorCategory};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for StorageError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfig(_) => ErrorCategory::InvalidInput,
            Self::NotFound(_) => ErrorCategory::ArtifactMissing,
            Self::ObjectStore(_) | Self::Metadata(_) | Self::Io(_) => ErrorCategory::TransientExternal,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

use doc_agent_common::{Classify, ErrorCategory};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaterialsError {
    #[error("invalid block id: {0}")]
    InvalidBlockId(String),
    #[error("no crop source found for block {0}")]
    CropNotFound(String),
    #[error("crop bytes did not look like a PDF (missing %PDF header)")]
    NotAPdf,
    #[error("render failed: {0}")]
    Render(#[from] doc_agent_evidence_renderer::EvidenceError),
    #[error("storage backend error: {0}")]
    Storage(String),
}

impl Classify for MaterialsError {
    fn category(&self) -> ErrorCategory {
        match self {
            MaterialsError::InvalidBlockId(_) => ErrorCategory::InvalidInput,
            MaterialsError::CropNotFound(_) | MaterialsError::NotAPdf => ErrorCategory::ArtifactMissing,
            MaterialsError::Render(_) => ErrorCategory::TransientExternal,
            MaterialsError::Storage(_) => ErrorCategory::TransientExternal,
        }
    }
}

pub type MaterialsResult<T> = Result<T, MaterialsError>;

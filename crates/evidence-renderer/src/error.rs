use doc_agent_common::{Classify, ErrorCategory};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("page {page} is out of range for this document")]
    PageOutOfRange { page: usize },
    #[error("bounding box has zero area after clamping")]
    DegenerateBbox,
    #[error("dpi {dpi} is outside the supported range [72, 400]")]
    DpiOutOfRange { dpi: u32 },
    #[error("pdf render failed: {0}")]
    Render(String),
    #[error("image encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

impl Classify for EvidenceError {
    fn category(&self) -> ErrorCategory {
        match self {
            EvidenceError::PageOutOfRange { .. } | EvidenceError::DegenerateBbox | EvidenceError::DpiOutOfRange { .. } => {
                ErrorCategory::InvalidInput
            }
            EvidenceError::Render(_) | EvidenceError::Encode(_) => ErrorCategory::TransientExternal,
        }
    }
}

pub type EvidenceResult<T> = Result<T, EvidenceError>;

//! Error taxonomy for the orchestrator crate (spec §7): every leaf-crate
//! error this crate calls into is folded into one enum so the pipeline can
//! turn any failure into a single `error` stream event without per-call-site
//! glue.

use doc_agent_common::{Classify, ErrorCategory};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Storage(#[from] doc_agent_storage::StorageError),
    #[error(transparent)]
    Llm(#[from] doc_agent_llm_adapter::LlmError),
    #[error(transparent)]
    Materials(#[from] doc_agent_materials_builder::MaterialsError),
    #[error(transparent)]
    Evidence(#[from] doc_agent_evidence_renderer::EvidenceError),
    #[error("request was cancelled")]
    Cancelled,
}

impl Classify for OrchestratorError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage(err) => err.category(),
            Self::Llm(err) => err.category(),
            Self::Materials(err) => err.category(),
            Self::Evidence(err) => err.category(),
            Self::Cancelled => ErrorCategory::Unknown,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

//! Shared data model, error taxonomy, and configuration for the document
//! analysis agent core (spec §3, §6, §7).

pub mod bbox;
pub mod block;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod materials;
pub mod schemas;

pub use bbox::BoundingBox;
pub use block::{Block, BlockId, BlockKind};
pub use config::AppConfig;
pub use document::{ArtifactVersion, DocumentArtifactKind, DocumentId};
pub use error::{Classify, ErrorCategory, PipelineError};
pub use events::{Profile, StreamEvent, TimestampedEvent};
pub use materials::{
    ComparisonSide, DocumentFacts, FactKeyValue, FactTable, ImageKind, MaterialImage,
    MaterialsPayload, SelectedBlock,
};
pub use schemas::{
    AnalysisIntent, AnswerResponse, Citation, DiffItem, FlashCollectorResponse, ImageRequest,
    Issue, RoiRequest, Severity,
};

//! Strict-JSON-schema request/response shapes exchanged with the LLM adapter (spec §4.5).

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::block::BlockId;
use crate::materials::DocumentFacts;

/// Output of the intent router (spec §4.1 step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisIntent {
    #[serde(default)]
    pub requires_visual_detail: bool,
    #[serde(default)]
    pub topic_summary: Option<String>,
    #[serde(default)]
    pub preferred_pages: Vec<u32>,
}

/// Request to render an IMAGE block's overview (and auto-quadrants if triggered).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub block_id: BlockId,
}

/// Request to render a specific region of interest within a block's crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiRequest {
    pub block_id: BlockId,
    pub bbox: BoundingBox,
    #[serde(default)]
    pub dpi: Option<u32>,
}

/// Output of the per-document flash-tier extractor (spec §4.1 step 3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashCollectorResponse {
    #[serde(default)]
    pub selected_blocks: Vec<BlockId>,
    #[serde(default)]
    pub requested_images: Vec<ImageRequest>,
    #[serde(default)]
    pub requested_rois: Vec<RoiRequest>,
    #[serde(default)]
    pub materials_summary: Option<String>,
}

/// Severity of an `Issue` raised in an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Ties a claim in the answer markdown to supporting evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub block_id: BlockId,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub evidence: Vec<Citation>,
}

/// One difference found in `compare` mode; `evidence` must cite at least one
/// block from each side whenever `before`/`after` are both non-empty (spec §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffItem {
    pub field: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub evidence: Vec<Citation>,
}

/// The answerer's structured output (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer_markdown: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub diff: Vec<DiffItem>,
    #[serde(default)]
    pub needs_more_evidence: bool,
    #[serde(default)]
    pub followup_images: Vec<BlockId>,
    #[serde(default)]
    pub followup_rois: Vec<RoiRequest>,
}

impl AnswerResponse {
    #[must_use]
    pub fn has_roi_citation(&self) -> bool {
        self.citations.iter().any(|c| c.bbox.is_some())
    }

    #[must_use]
    pub fn has_followups(&self) -> bool {
        !self.followup_images.is_empty() || !self.followup_rois.is_empty()
    }
}

/// Bundles `DocumentFacts` back into the schemas module so callers importing
/// schemas get the facts shape without reaching into `materials` directly.
pub type Facts = DocumentFacts;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_detects_roi_citation() {
        let mut answer = AnswerResponse {
            answer_markdown: "x".into(),
            ..Default::default()
        };
        assert!(!answer.has_roi_citation());
        answer.citations.push(Citation {
            block_id: BlockId::parse("AAAA-BBBB-001").unwrap(),
            page: None,
            bbox: BoundingBox::clamped(0.0, 0.0, 0.5, 0.5),
        });
        assert!(answer.has_roi_citation());
    }

    #[test]
    fn deserializes_with_missing_optional_fields() {
        let json = r#"{"answer_markdown": "hello"}"#;
        let answer: AnswerResponse = serde_json::from_str(json).unwrap();
        assert_eq!(answer.answer_markdown, "hello");
        assert!(answer.citations.is_empty());
        assert!(!answer.needs_more_evidence);
    }
}

//! The materials payload assembled for the answerer (spec §3, §4.4).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::block::BlockId;
use crate::document::DocumentId;

/// Which render kind a `MaterialImage` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Overview,
    Quadrant,
    Roi,
}

/// A block selected by the extractor/coverage pass, ready to hand to the answerer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedBlock {
    pub block_id: BlockId,
    pub page: u32,
    pub content: String,
    /// Set in `compare` mode to label which side of the comparison this block came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<ComparisonSide>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonSide {
    DocA,
    DocB,
}

/// Prints the `DOC_A`/`DOC_B` label the answerer prompts tell the model to
/// look for in the materials text (spec §4.4) — deliberately distinct from
/// the derived `Debug` form, which prints the Rust identifiers.
impl fmt::Display for ComparisonSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DocA => "DOC_A",
            Self::DocB => "DOC_B",
        })
    }
}

/// A rendered image handed to the answerer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialImage {
    pub block_id: BlockId,
    pub kind: ImageKind,
    /// Reference returned by the LLM provider's file-upload API.
    pub uploaded_file_ref: String,
    pub public_url: Option<String>,
    pub width: u32,
    pub height: u32,
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

impl MaterialImage {
    /// Dedup key used across follow-up iterations: `(block_id, kind, bbox)`.
    #[must_use]
    pub fn dedup_key(&self) -> (BlockId, ImageKind, Option<String>) {
        (
            self.block_id.clone(),
            self.kind,
            self.bbox.map(|b| b.cache_fragment()),
        )
    }
}

/// Generic facts extracted from TEXT/TABLE blocks (spec §4.1 step 4).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFacts {
    #[serde(default)]
    pub key_values: Vec<FactKeyValue>,
    #[serde(default)]
    pub tables: Vec<FactTable>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactKeyValue {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub source_block_id: Option<BlockId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub source_block_id: Option<BlockId>,
}

/// The payload handed to the answerer, `MATERIALS_JSON` on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialsPayload {
    pub blocks: Vec<SelectedBlock>,
    pub images: Vec<MaterialImage>,
    pub source_documents: Vec<DocumentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_facts: Option<DocumentFacts>,
}

impl MaterialsPayload {
    /// Merges `other` into `self`, de-duplicating images by `(block_id, kind, bbox)`
    /// and blocks by `block_id`. Used by the follow-up loop to incrementally grow
    /// materials across iterations without re-uploading existing renders.
    pub fn merge(&mut self, other: MaterialsPayload) {
        let existing_image_keys: std::collections::HashSet<_> =
            self.images.iter().map(MaterialImage::dedup_key).collect();
        for image in other.images {
            if !existing_image_keys.contains(&image.dedup_key()) {
                self.images.push(image);
            }
        }

        let existing_block_ids: std::collections::HashSet<_> =
            self.blocks.iter().map(|b| b.block_id.clone()).collect();
        for block in other.blocks {
            if !existing_block_ids.contains(&block.block_id) {
                self.blocks.push(block);
            }
        }

        for doc_id in other.source_documents {
            if !self.source_documents.contains(&doc_id) {
                self.source_documents.push(doc_id);
            }
        }

        if self.extracted_facts.is_none() {
            self.extracted_facts = other.extracted_facts;
        }
    }

    #[must_use]
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

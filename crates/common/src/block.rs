//! Canonical block identifiers and the typed block model (spec §3, §4.2).

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn block_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{4}-[A-Z0-9]{4}-[A-Z0-9]{3}$").unwrap())
}

/// A validated 12-character block identifier in canonical `XXXX-XXXX-XXX` form.
///
/// Never constructed from a path or URL; the LLM and the renderer only ever
/// exchange these opaque strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId(String);

impl BlockId {
    /// Validates `raw` against the canonical regex, returning `None` on mismatch.
    ///
    /// Callers that receive IDs from an LLM response must use this instead of
    /// constructing a `BlockId` directly; a non-matching ID is hallucinated
    /// and must be dropped, never forwarded to the renderer.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        block_id_pattern().is_match(raw).then(|| Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BlockId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid block id: {value}"))
    }
}

impl From<BlockId> for String {
    fn from(value: BlockId) -> Self {
        value.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three block kinds a document can be decomposed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockKind {
    Text,
    Image,
    Table,
}

/// One parsed unit of a document's Markdown block stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    /// 1-based page number; defaults to 1 when no page heading precedes the block.
    pub page: u32,
    pub content: String,
    /// Other block IDs referenced from this block's content via `→XXXX-XXXX-XXX` tokens.
    pub linked_ids: Vec<BlockId>,
    /// Crop URL for IMAGE blocks, resolved via the blocks-index manifest or its fallbacks.
    pub crop_url: Option<String>,
}

impl Block {
    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(self.kind, BlockKind::Image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_form() {
        assert!(BlockId::parse("AAAA-BBBB-001").is_some());
        assert!(BlockId::parse("ZZZZ-ZZZZ-ZZZ").is_some());
    }

    #[test]
    fn rejects_lowercase_and_wrong_lengths() {
        assert!(BlockId::parse("aaaa-bbbb-001").is_none());
        assert!(BlockId::parse("AAAA-BBBB-01").is_none());
        assert!(BlockId::parse("AAAA-BBBB-0011").is_none());
        assert!(BlockId::parse("AAAABBBB001").is_none());
        assert!(BlockId::parse("bad-id").is_none());
    }

    #[test]
    fn serde_round_trip_only_for_valid_ids() {
        let id = BlockId::parse("AAAA-BBBB-001").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"AAAA-BBBB-001\"");
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        let err = serde_json::from_str::<BlockId>("\"not-valid\"");
        assert!(err.is_err());
    }
}

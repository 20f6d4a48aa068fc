//! Document identity and artifact versioning (spec §3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for one source document.
pub type DocumentId = Uuid;

/// How an artifact's version was determined. Prefer object-store metadata
/// over a content hash — the spec requires that different versions of the
/// same source never share a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactVersion {
    ETag(String),
    LastModified(String),
    /// First 16 hex chars of SHA-256 of the artifact bytes, used only when
    /// neither an ETag nor a last-modified timestamp is available.
    ContentHash(String),
}

impl ArtifactVersion {
    /// Computes a version from object-store metadata when present, falling
    /// back to a content hash of `bytes`.
    #[must_use]
    pub fn derive(etag: Option<&str>, last_modified: Option<&str>, bytes: &[u8]) -> Self {
        if let Some(etag) = etag {
            return Self::ETag(etag.to_string());
        }
        if let Some(last_modified) = last_modified {
            return Self::LastModified(last_modified.to_string());
        }
        Self::ContentHash(content_hash16(bytes))
    }

    /// Flattened string used as the `source_version` segment of a cache key.
    #[must_use]
    pub fn as_key_fragment(&self) -> &str {
        match self {
            Self::ETag(v) | Self::LastModified(v) | Self::ContentHash(v) => v,
        }
    }
}

fn content_hash16(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(bytes);
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

/// Which artifact the caller is asking about for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentArtifactKind {
    Annotation,
    OcrHtml,
    ResultMd,
    ResultJson,
    CropsFolder,
}

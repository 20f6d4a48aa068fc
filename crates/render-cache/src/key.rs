//! Render-cache key construction (spec §3, §4.3).

use doc_agent_common::BoundingBox;

/// Identifies one cached render: `source_id:source_version:page:dpi[:bbox]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub source_id: String,
    pub source_version: String,
    pub page: u32,
    pub dpi: u32,
    pub bbox: Option<BoundingBox>,
}

impl CacheKey {
    #[must_use]
    pub fn new(source_id: impl Into<String>, source_version: impl Into<String>, page: u32, dpi: u32, bbox: Option<BoundingBox>) -> Self {
        Self {
            source_id: source_id.into(),
            source_version: source_version.into(),
            page,
            dpi,
            bbox,
        }
    }

    /// The canonical string form stored as the primary key in the metadata DB.
    #[must_use]
    pub fn as_string(&self) -> String {
        match &self.bbox {
            Some(bbox) => format!(
                "{}:{}:{}:{}:{}",
                self.source_id,
                self.source_version,
                self.page,
                self.dpi,
                bbox.cache_fragment()
            ),
            None => format!("{}:{}:{}:{}", self.source_id, self.source_version, self.page, self.dpi),
        }
    }

    /// The `source_id:` prefix used by `invalidate` to match every version of one source.
    #[must_use]
    pub fn source_prefix(source_id: &str) -> String {
        format!("{source_id}:")
    }

    /// The filesystem-safe file name the cached bytes are stored under: the
    /// MD5 hex digest of the canonical key string.
    #[must_use]
    pub fn file_name(&self) -> String {
        let digest = md5::Md5Digest::compute(self.as_string().as_bytes());
        digest.to_hex()
    }
}

/// Thin wrapper so we don't pull the `md-5` crate's trait API into every
/// caller; keeps the hashing detail local to this module.
mod md5 {
    use md_5::{Digest, Md5};

    pub struct Md5Digest([u8; 16]);

    impl Md5Digest {
        pub fn compute(bytes: &[u8]) -> Self {
            let mut hasher = Md5::new();
            hasher.update(bytes);
            let out = hasher.finalize();
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&out);
            Self(buf)
        }

        pub fn to_hex(&self) -> String {
            self.0.iter().map(|b| format!("{b:02x}")).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_without_bbox() {
        let key = CacheKey::new("doc1", "v1", 0, 150, None);
        assert_eq!(key.as_string(), "doc1:v1:0:150");
    }

    #[test]
    fn key_with_bbox_includes_fragment() {
        let bbox = BoundingBox::clamped(0.0, 0.0, 0.5, 0.5).unwrap();
        let key = CacheKey::new("doc1", "v1", 0, 300, Some(bbox));
        assert_eq!(key.as_string(), "doc1:v1:0:300:0.0000,0.0000,0.5000,0.5000");
    }

    #[test]
    fn different_versions_produce_disjoint_keys() {
        let a = CacheKey::new("doc1", "v1", 0, 150, None);
        let b = CacheKey::new("doc1", "v2", 0, 150, None);
        assert_ne!(a.as_string(), b.as_string());
        assert_ne!(a.file_name(), b.file_name());
    }

    #[test]
    fn file_name_is_deterministic_hex() {
        let key = CacheKey::new("doc1", "v1", 0, 150, None);
        let name = key.file_name();
        assert_eq!(name.len(), 32);
        assert_eq!(name, key.file_name());
    }
}

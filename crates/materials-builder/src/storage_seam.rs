//! The narrow storage seam the materials builder needs (spec §4.4, §6): crop
//! lookup, byte fetch, and the two upload targets. `doc-agent-storage`
//! implements this against the real metadata/object stores; tests use an
//! in-memory fake, the same trait-with-fake-impl pattern `PdfDocument` and
//! `LlmClient` use elsewhere in this workspace.

use async_trait::async_trait;
use doc_agent_common::BlockId;

use crate::error::MaterialsResult;

/// Where a crop PDF's bytes can be found, in lookup-order preference.
#[derive(Debug, Clone)]
pub enum CropSource {
    /// A direct object-store key, e.g. from the authoritative blocks-index.
    ObjectKey(String),
    /// An HTTP fallback URL (the configured public base URL joined with the
    /// crop's relative path).
    HttpUrl(String),
}

#[async_trait]
pub trait MaterialsStorage: Send + Sync {
    /// Lookup order (i) blocks-index of any referenced document, (ii) the
    /// fallback blocks-index path derived from tree-file naming convention,
    /// (iii) per-document crops in the metadata store matched by normalised
    /// filename.
    async fn locate_crop_source(&self, block_id: &BlockId) -> MaterialsResult<Option<CropSource>>;

    /// Fetches the bytes behind a located source, trying the object store
    /// first and an HTTP GET as fallback when the source is already an
    /// HTTP URL.
    async fn fetch_bytes(&self, source: &CropSource) -> MaterialsResult<Option<Vec<u8>>>;

    /// Uploads a rendered PNG to the LLM provider's file API, returning the
    /// URI/MIME pair future calls reference it by.
    async fn upload_to_llm(&self, png_bytes: &[u8], file_name: &str) -> MaterialsResult<String>;

    /// Uploads a rendered PNG to the object store under
    /// `chat_images/<name>_<random>.png`, returning `(object_key, public_url)`.
    async fn upload_to_object_store(&self, png_bytes: &[u8], file_name: &str) -> MaterialsResult<(String, Option<String>)>;
}

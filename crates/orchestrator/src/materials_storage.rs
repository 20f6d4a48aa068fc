//! Bridges `doc-agent-storage`'s metadata/object stores into the narrow
//! `MaterialsStorage` seam `doc-agent-materials-builder` calls into (spec
//! §4.4, §6). One instance is built per request, scoped to the documents the
//! request references, and caches each document's parsed blocks index so
//! repeated crop lookups within the same request don't re-fetch it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use doc_agent_common::{Block, BlockId};
use doc_agent_materials_builder::{CropSource, MaterialsError, MaterialsResult, MaterialsStorage};
use doc_agent_storage::{ObjectStore, ProjectStore};
use tokio::sync::Mutex;
use uuid::Uuid;

/// `MaterialsStorage` backed by the real object store and the read-only
/// project tree, scoped to one request's set of referenced documents.
pub struct ProjectMaterialsStorage {
    object_store: Arc<dyn ObjectStore>,
    project_store: Arc<dyn ProjectStore>,
    document_node_ids: Vec<Uuid>,
    user_id: Uuid,
    blocks_cache: Mutex<HashMap<Uuid, Vec<Block>>>,
}

impl ProjectMaterialsStorage {
    #[must_use]
    pub fn new(object_store: Arc<dyn ObjectStore>, project_store: Arc<dyn ProjectStore>, document_node_ids: Vec<Uuid>, user_id: Uuid) -> Self {
        Self { object_store, project_store, document_node_ids, user_id, blocks_cache: Mutex::new(HashMap::new()) }
    }

    /// Loads and parses a document's blocks index, preferring the
    /// authoritative `result_json` artifact and falling back to a node file
    /// matching the `*_blocks.json` naming convention.
    async fn blocks_for_node(&self, node_id: Uuid) -> MaterialsResult<Vec<Block>> {
        {
            let cache = self.blocks_cache.lock().await;
            if let Some(blocks) = cache.get(&node_id) {
                return Ok(blocks.clone());
            }
        }

        let object_key = match self.project_store.get_blocks_index_for_node(node_id).await.map_err(|err| MaterialsError::Storage(err.to_string()))? {
            Some(key) => Some(key),
            None => self.fallback_blocks_index_key(node_id).await?,
        };

        let blocks = match object_key {
            Some(key) => match self.object_store.download(&key).await.map_err(|err| MaterialsError::Storage(err.to_string()))? {
                Some(bytes) => serde_json::from_slice(&bytes).map_err(|err| MaterialsError::Storage(format!("blocks index is not valid JSON: {err}")))?,
                None => Vec::new(),
            },
            None => Vec::new(),
        };

        self.blocks_cache.lock().await.insert(node_id, blocks.clone());
        Ok(blocks)
    }

    async fn fallback_blocks_index_key(&self, node_id: Uuid) -> MaterialsResult<Option<String>> {
        let files = self.project_store.get_node_files(node_id).await.map_err(|err| MaterialsError::Storage(err.to_string()))?;
        Ok(files.into_iter().find(|file| file.file_name.ends_with("_blocks.json")).map(|file| file.object_key))
    }

    async fn locate_in_crops_table(&self, node_id: Uuid, block_id: &BlockId) -> MaterialsResult<Option<CropSource>> {
        let crops = self.project_store.get_document_crops(node_id).await.map_err(|err| MaterialsError::Storage(err.to_string()))?;
        let normalized = format!("{}.png", block_id.as_str());
        Ok(crops.into_iter().find(|crop| crop.file_name.eq_ignore_ascii_case(&normalized)).map(|crop| CropSource::ObjectKey(crop.object_key)))
    }

    fn crop_url_to_source(crop_url: &str) -> CropSource {
        if crop_url.starts_with("http://") || crop_url.starts_with("https://") {
            CropSource::HttpUrl(crop_url.to_string())
        } else {
            CropSource::ObjectKey(crop_url.to_string())
        }
    }
}

#[async_trait]
impl MaterialsStorage for ProjectMaterialsStorage {
    async fn locate_crop_source(&self, block_id: &BlockId) -> MaterialsResult<Option<CropSource>> {
        for node_id in &self.document_node_ids {
            let blocks = self.blocks_for_node(*node_id).await?;
            if let Some(block) = blocks.iter().find(|block| &block.id == block_id) {
                if let Some(crop_url) = &block.crop_url {
                    return Ok(Some(Self::crop_url_to_source(crop_url)));
                }
            }
        }

        for node_id in &self.document_node_ids {
            if let Some(source) = self.locate_in_crops_table(*node_id, block_id).await? {
                return Ok(Some(source));
            }
        }

        Ok(None)
    }

    async fn fetch_bytes(&self, source: &CropSource) -> MaterialsResult<Option<Vec<u8>>> {
        match source {
            CropSource::ObjectKey(key) => self.object_store.download(key).await.map_err(|err| MaterialsError::Storage(err.to_string())),
            CropSource::HttpUrl(url) => {
                let response = reqwest::get(url).await.map_err(|err| MaterialsError::Storage(err.to_string()))?;
                if !response.status().is_success() {
                    return Ok(None);
                }
                let bytes = response.bytes().await.map_err(|err| MaterialsError::Storage(err.to_string()))?;
                Ok(Some(bytes.to_vec()))
            }
        }
    }

    async fn upload_to_llm(&self, png_bytes: &[u8], file_name: &str) -> MaterialsResult<String> {
        let key = self.object_store.generate_key(&self.user_id.to_string(), ".png");
        let public_url = self.object_store.upload(&key, png_bytes, "image/png").await.map_err(|err| MaterialsError::Storage(err.to_string()))?;
        public_url.ok_or_else(|| MaterialsError::Storage(format!("object store has no public url configured; cannot hand {file_name} to the llm provider by reference")))
    }

    async fn upload_to_object_store(&self, png_bytes: &[u8], file_name: &str) -> MaterialsResult<(String, Option<String>)> {
        let sanitized: String = file_name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' }).collect();
        let key = format!("chat_images/{sanitized}_{}.png", Uuid::new_v4());
        let public_url = self.object_store.upload(&key, png_bytes, "image/png").await.map_err(|err| MaterialsError::Storage(err.to_string()))?;
        Ok((key, public_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_agent_common::DocumentArtifactKind;
    use doc_agent_storage::error::StorageResult;

    struct FakeObjectStore {
        public_base: Option<String>,
    }

    #[async_trait]
    impl ObjectStore for FakeObjectStore {
        async fn upload(&self, key: &str, _bytes: &[u8], _content_type: &str) -> StorageResult<Option<String>> {
            Ok(self.public_base.as_ref().map(|base| format!("{base}/{key}")))
        }
        async fn download(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
        async fn head(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
        fn generate_key(&self, user_id: &str, ext: &str) -> String {
            format!("generated/{user_id}{ext}")
        }
        fn public_url(&self, key: &str) -> Option<String> {
            self.public_base.as_ref().map(|base| format!("{base}/{key}"))
        }
    }

    struct FakeProjectStore;

    #[async_trait]
    impl ProjectStore for FakeProjectStore {
        async fn get_tree_nodes(&self, _client_id: Option<Uuid>, _parent_id: Option<Uuid>, _node_type: Option<&str>, _all_nodes: bool) -> StorageResult<Vec<doc_agent_storage::models::TreeNode>> {
            Ok(Vec::new())
        }
        async fn get_node_by_id(&self, _node_id: Uuid) -> StorageResult<Option<doc_agent_storage::models::TreeNode>> {
            Ok(None)
        }
        async fn get_node_files(&self, _node_id: Uuid) -> StorageResult<Vec<doc_agent_storage::models::NodeFile>> {
            Ok(Vec::new())
        }
        async fn get_document_results(&self, _node_id: Uuid, _file_type: Option<DocumentArtifactKind>) -> StorageResult<Vec<doc_agent_storage::models::DocumentResult>> {
            Ok(Vec::new())
        }
        async fn get_document_crops(&self, _node_id: Uuid) -> StorageResult<Vec<doc_agent_storage::models::DocumentCrop>> {
            Ok(Vec::new())
        }
        async fn get_blocks_index_for_node(&self, _node_id: Uuid) -> StorageResult<Option<String>> {
            Ok(None)
        }
        async fn search_documents(&self, _client_id: Uuid, _query: &str, _limit: i64) -> StorageResult<Vec<doc_agent_storage::models::TreeNode>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn upload_to_llm_fails_without_public_url() {
        let storage = ProjectMaterialsStorage::new(Arc::new(FakeObjectStore { public_base: None }), Arc::new(FakeProjectStore), Vec::new(), Uuid::new_v4());
        let err = storage.upload_to_llm(b"bytes", "crop.png").await.unwrap_err();
        assert!(matches!(err, MaterialsError::Storage(_)));
    }

    #[tokio::test]
    async fn upload_to_llm_returns_public_url() {
        let storage = ProjectMaterialsStorage::new(Arc::new(FakeObjectStore { public_base: Some("https://cdn.example.com".to_string()) }), Arc::new(FakeProjectStore), Vec::new(), Uuid::new_v4());
        let uri = storage.upload_to_llm(b"bytes", "crop.png").await.unwrap();
        assert!(uri.starts_with("https://cdn.example.com/"));
    }

    #[tokio::test]
    async fn upload_to_object_store_sanitizes_file_name() {
        let storage = ProjectMaterialsStorage::new(Arc::new(FakeObjectStore { public_base: None }), Arc::new(FakeProjectStore), Vec::new(), Uuid::new_v4());
        let (key, public_url) = storage.upload_to_object_store(b"bytes", "a b/c.png").await.unwrap();
        assert!(key.starts_with("chat_images/a_b_c_"));
        assert!(public_url.is_none());
    }

    #[tokio::test]
    async fn locate_crop_source_returns_none_when_no_documents_referenced() {
        let storage = ProjectMaterialsStorage::new(Arc::new(FakeObjectStore { public_base: None }), Arc::new(FakeProjectStore), Vec::new(), Uuid::new_v4());
        let block_id = BlockId::parse("AAAA-BBBB-001").unwrap();
        assert!(storage.locate_crop_source(&block_id).await.unwrap().is_none());
    }
}

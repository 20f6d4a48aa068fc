//! The narrow seam the cascade needs against the metadata store, object
//! store, and dialog log (spec §4.7, §6): list a chat's image artifacts,
//! delete each one, then delete the per-chat log file and the three
//! metadata rows in cascade order. `doc-agent-storage` implements this
//! against the real stores; tests use an in-memory fake, the same
//! trait-with-fake-impl pattern used elsewhere in this workspace.

use async_trait::async_trait;

use crate::error::DeletionResult;

#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub object_key: String,
}

#[async_trait]
pub trait DeletionBackend: Send + Sync {
    async fn list_chat_images(&self, chat_id: &str) -> DeletionResult<Vec<ImageArtifact>>;
    async fn delete_object(&self, object_key: &str) -> DeletionResult<()>;
    async fn delete_chat_log(&self, chat_id: &str) -> DeletionResult<()>;
    async fn delete_chat_images_rows(&self, chat_id: &str) -> DeletionResult<()>;
    async fn delete_chat_messages_rows(&self, chat_id: &str) -> DeletionResult<()>;
    async fn delete_chat_row(&self, chat_id: &str) -> DeletionResult<()>;
}

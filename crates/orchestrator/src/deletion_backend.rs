//! Bridges `doc-agent-storage` and `doc-agent-dialog-logger` into the
//! `DeletionBackend` seam `doc-agent-deletion-worker`'s cascade calls into
//! (spec §4.7, §6, §9 open question decision 1: the cascade deletes
//! `chat_images`, then `chat_messages`, then `chats`).

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use doc_agent_deletion_worker::{DeletionBackend, DeletionError, DeletionResult, ImageArtifact};
use doc_agent_dialog_logger::DialogLogger;
use doc_agent_storage::{MetadataStore, ObjectStore};
use uuid::Uuid;

pub struct StorageDeletionBackend {
    metadata_store: Arc<dyn MetadataStore>,
    object_store: Arc<dyn ObjectStore>,
    dialog_logger: Arc<DialogLogger>,
}

impl StorageDeletionBackend {
    #[must_use]
    pub fn new(metadata_store: Arc<dyn MetadataStore>, object_store: Arc<dyn ObjectStore>, dialog_logger: Arc<DialogLogger>) -> Self {
        Self { metadata_store, object_store, dialog_logger }
    }

    fn parse_chat_id(chat_id: &str) -> DeletionResult<Uuid> {
        Uuid::from_str(chat_id).map_err(|err| DeletionError::Backend(format!("invalid chat id {chat_id}: {err}")))
    }
}

#[async_trait]
impl DeletionBackend for StorageDeletionBackend {
    async fn list_chat_images(&self, chat_id: &str) -> DeletionResult<Vec<ImageArtifact>> {
        let chat_id = Self::parse_chat_id(chat_id)?;
        let images = self.metadata_store.list_chat_images(chat_id).await.map_err(|err| DeletionError::Backend(err.to_string()))?;
        Ok(images.into_iter().map(|image| ImageArtifact { object_key: image.object_key }).collect())
    }

    async fn delete_object(&self, object_key: &str) -> DeletionResult<()> {
        self.object_store.delete(object_key).await.map_err(|err| DeletionError::Backend(err.to_string()))
    }

    async fn delete_chat_log(&self, chat_id: &str) -> DeletionResult<()> {
        self.dialog_logger.delete(chat_id).await.map_err(|err| DeletionError::Backend(err.to_string()))
    }

    async fn delete_chat_images_rows(&self, _chat_id: &str) -> DeletionResult<()> {
        // The metadata store's cascade deletes chat_images, chat_messages, and
        // chats together (see `delete_chat_row`); nothing to do separately.
        Ok(())
    }

    async fn delete_chat_messages_rows(&self, _chat_id: &str) -> DeletionResult<()> {
        Ok(())
    }

    async fn delete_chat_row(&self, chat_id: &str) -> DeletionResult<()> {
        let chat_id = Self::parse_chat_id(chat_id)?;
        self.metadata_store.delete_chat_cascade(chat_id).await.map_err(|err| DeletionError::Backend(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_agent_common::config::DialogLogConfig;
    use doc_agent_storage::models::{Chat, ChatImage, ChatMessage, MessageRole, StorageFile, SystemPrompt, User, UserPrompt, UserSettings};
    use doc_agent_storage::error::StorageResult;
    use std::sync::Mutex;

    struct FakeMetadataStore {
        cascades: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl MetadataStore for FakeMetadataStore {
        async fn init_schema(&self) -> StorageResult<()> {
            Ok(())
        }
        async fn get_user_by_static_token(&self, _token: &str) -> StorageResult<Option<User>> {
            Ok(None)
        }
        async fn get_user_by_id(&self, _id: Uuid) -> StorageResult<Option<User>> {
            Ok(None)
        }
        async fn update_user_last_seen(&self, _id: Uuid) -> StorageResult<()> {
            Ok(())
        }
        async fn get_user_settings(&self, _user_id: Uuid) -> StorageResult<Option<UserSettings>> {
            Ok(None)
        }
        async fn create_default_settings(&self, user_id: Uuid) -> StorageResult<UserSettings> {
            Ok(UserSettings::default_for(user_id))
        }
        async fn update_user_settings(&self, _settings: &UserSettings) -> StorageResult<()> {
            Ok(())
        }
        async fn get_system_prompts(&self, _active_only: bool) -> StorageResult<Vec<SystemPrompt>> {
            Ok(Vec::new())
        }
        async fn get_system_prompt_by_name(&self, _name: &str) -> StorageResult<Option<SystemPrompt>> {
            Ok(None)
        }
        async fn get_user_prompts(&self, _user_id: Uuid, _active_only: bool) -> StorageResult<Vec<UserPrompt>> {
            Ok(Vec::new())
        }
        async fn get_user_prompt_by_id(&self, _id: Uuid) -> StorageResult<Option<UserPrompt>> {
            Ok(None)
        }
        async fn create_chat(&self, user_id: Uuid, title: &str) -> StorageResult<Chat> {
            Ok(Chat { id: Uuid::new_v4(), user_id, title: title.to_string(), created_at: chrono::Utc::now() })
        }
        async fn get_chat(&self, _chat_id: Uuid) -> StorageResult<Option<Chat>> {
            Ok(None)
        }
        async fn get_user_chats(&self, _user_id: Uuid, _limit: i64) -> StorageResult<Vec<Chat>> {
            Ok(Vec::new())
        }
        async fn delete_chat_cascade(&self, chat_id: Uuid) -> StorageResult<()> {
            self.cascades.lock().unwrap().push(chat_id);
            Ok(())
        }
        async fn add_message(&self, chat_id: Uuid, role: MessageRole, content: &str, message_type: &str) -> StorageResult<ChatMessage> {
            Ok(ChatMessage { id: Uuid::new_v4(), chat_id, role, content: content.to_string(), message_type: message_type.to_string(), created_at: chrono::Utc::now() })
        }
        async fn get_chat_messages(&self, _chat_id: Uuid, _limit: i64) -> StorageResult<Vec<ChatMessage>> {
            Ok(Vec::new())
        }
        async fn get_last_message(&self, _chat_id: Uuid, _role: Option<MessageRole>) -> StorageResult<Option<ChatMessage>> {
            Ok(None)
        }
        async fn add_chat_image(
            &self,
            chat_id: Uuid,
            message_id: Uuid,
            file_id: Option<Uuid>,
            image_type: &str,
            description: &str,
            width: Option<u32>,
            height: Option<u32>,
            object_key: &str,
        ) -> StorageResult<ChatImage> {
            Ok(ChatImage {
                id: Uuid::new_v4(),
                chat_id,
                message_id,
                file_id,
                image_type: image_type.to_string(),
                description: description.to_string(),
                width,
                height,
                object_key: object_key.to_string(),
            })
        }
        async fn get_message_images(&self, _message_id: Uuid) -> StorageResult<Vec<ChatImage>> {
            Ok(Vec::new())
        }
        async fn get_chat_storage_files(&self, _chat_id: Uuid) -> StorageResult<Vec<StorageFile>> {
            Ok(Vec::new())
        }
        async fn register_file(&self, _chat_id: Uuid, _object_key: &str, _public_url: Option<&str>, _content_type: &str) -> StorageResult<Uuid> {
            Ok(Uuid::new_v4())
        }
        async fn list_chat_images(&self, _chat_id: Uuid) -> StorageResult<Vec<ChatImage>> {
            Ok(Vec::new())
        }
    }

    struct FakeObjectStore;

    #[async_trait]
    impl ObjectStore for FakeObjectStore {
        async fn upload(&self, _key: &str, _bytes: &[u8], _content_type: &str) -> StorageResult<Option<String>> {
            Ok(None)
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
            format!("{user_id}{ext}")
        }
        fn public_url(&self, _key: &str) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn delete_chat_row_invokes_cascade_with_parsed_uuid() {
        let metadata = Arc::new(FakeMetadataStore { cascades: Mutex::new(Vec::new()) });
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(DialogLogger::new(&DialogLogConfig { log_dir: dir.path().to_string_lossy().into_owned(), truncate_chars: 100 }));
        let backend = StorageDeletionBackend::new(metadata.clone(), Arc::new(FakeObjectStore), logger);

        let chat_id = Uuid::new_v4();
        backend.delete_chat_row(&chat_id.to_string()).await.unwrap();
        assert_eq!(metadata.cascades.lock().unwrap().as_slice(), [chat_id]);
    }

    #[tokio::test]
    async fn delete_chat_row_rejects_invalid_uuid() {
        let metadata = Arc::new(FakeMetadataStore { cascades: Mutex::new(Vec::new()) });
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(DialogLogger::new(&DialogLogConfig { log_dir: dir.path().to_string_lossy().into_owned(), truncate_chars: 100 }));
        let backend = StorageDeletionBackend::new(metadata, Arc::new(FakeObjectStore), logger);

        assert!(backend.delete_chat_row("not-a-uuid").await.is_err());
    }
}

//! Metadata store (spec §6): the narrow relational interface the
//! orchestrator and api-server use for users, prompts, chats, messages,
//! images, and the read-only project-side tree. One `PostgresMetadataStore`
//! backs all of it; the schema follows the teacher's `init_schema`
//! create-if-not-exists idiom, with one table per aggregate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{Chat, ChatImage, ChatMessage, MessageRole, StorageFile, SystemPrompt, User, UserPrompt, UserSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "doc_agent".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!("host={} port={} dbname={} user={} password={}", self.host, self.port, self.database, self.user, self.password)
    }
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn init_schema(&self) -> StorageResult<()>;

    async fn get_user_by_static_token(&self, token: &str) -> StorageResult<Option<User>>;
    async fn get_user_by_id(&self, id: Uuid) -> StorageResult<Option<User>>;
    async fn update_user_last_seen(&self, id: Uuid) -> StorageResult<()>;

    async fn get_user_settings(&self, user_id: Uuid) -> StorageResult<Option<UserSettings>>;
    async fn create_default_settings(&self, user_id: Uuid) -> StorageResult<UserSettings>;
    async fn update_user_settings(&self, settings: &UserSettings) -> StorageResult<()>;

    async fn get_system_prompts(&self, active_only: bool) -> StorageResult<Vec<SystemPrompt>>;
    async fn get_system_prompt_by_name(&self, name: &str) -> StorageResult<Option<SystemPrompt>>;
    async fn get_user_prompts(&self, user_id: Uuid, active_only: bool) -> StorageResult<Vec<UserPrompt>>;
    async fn get_user_prompt_by_id(&self, id: Uuid) -> StorageResult<Option<UserPrompt>>;

    async fn create_chat(&self, user_id: Uuid, title: &str) -> StorageResult<Chat>;
    async fn get_chat(&self, chat_id: Uuid) -> StorageResult<Option<Chat>>;
    async fn get_user_chats(&self, user_id: Uuid, limit: i64) -> StorageResult<Vec<Chat>>;
    /// Deletes `chat_images`, then `chat_messages`, then `chats` rows for
    /// `chat_id`, in that order (spec §4.7, §9 open question decision).
    async fn delete_chat_cascade(&self, chat_id: Uuid) -> StorageResult<()>;

    async fn add_message(&self, chat_id: Uuid, role: MessageRole, content: &str, message_type: &str) -> StorageResult<ChatMessage>;
    async fn get_chat_messages(&self, chat_id: Uuid, limit: i64) -> StorageResult<Vec<ChatMessage>>;
    async fn get_last_message(&self, chat_id: Uuid, role: Option<MessageRole>) -> StorageResult<Option<ChatMessage>>;

    #[allow(clippy::too_many_arguments)]
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
    ) -> StorageResult<ChatImage>;
    async fn get_message_images(&self, message_id: Uuid) -> StorageResult<Vec<ChatImage>>;
    async fn get_chat_storage_files(&self, chat_id: Uuid) -> StorageResult<Vec<StorageFile>>;
    async fn register_file(&self, chat_id: Uuid, object_key: &str, public_url: Option<&str>, content_type: &str) -> StorageResult<Uuid>;

    /// Every `chat_images` row for `chat_id`, used by the deletion cascade
    /// to find object-store keys to delete before the metadata rows go.
    async fn list_chat_images(&self, chat_id: Uuid) -> StorageResult<Vec<ChatImage>>;
}

pub struct PostgresMetadataStore {
    pub(crate) client: Client,
}

impl PostgresMetadataStore {
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls).await.map_err(|err| StorageError::Metadata(err.to_string()))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(%err, "postgres connection closed with error");
            }
        });

        Ok(Self { client })
    }

    fn map_pg_err(err: tokio_postgres::Error) -> StorageError {
        StorageError::Metadata(err.to_string())
    }

    fn row_to_user(row: &tokio_postgres::Row) -> User {
        User { id: row.get(0), static_token: row.get(1), display_name: row.get(2), last_seen_at: row.get(3) }
    }

    fn row_to_settings(row: &tokio_postgres::Row) -> UserSettings {
        UserSettings { user_id: row.get(0), default_profile: row.get(1), preferred_model_tier: row.get(2) }
    }

    fn row_to_chat(row: &tokio_postgres::Row) -> Chat {
        Chat { id: row.get(0), user_id: row.get(1), title: row.get(2), created_at: row.get(3) }
    }

    fn row_to_message(row: &tokio_postgres::Row) -> StorageResult<ChatMessage> {
        let role: String = row.get(2);
        Ok(ChatMessage {
            id: row.get(0),
            chat_id: row.get(1),
            role: parse_role(&role)?,
            content: row.get(3),
            message_type: row.get(4),
            created_at: row.get(5),
        })
    }

    fn row_to_chat_image(row: &tokio_postgres::Row) -> ChatImage {
        ChatImage {
            id: row.get(0),
            chat_id: row.get(1),
            message_id: row.get(2),
            file_id: row.get(3),
            image_type: row.get(4),
            description: row.get(5),
            width: row.get::<_, Option<i32>>(6).map(|w| w as u32),
            height: row.get::<_, Option<i32>>(7).map(|h| h as u32),
            object_key: row.get(8),
        }
    }
}

fn role_db_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

fn parse_role(raw: &str) -> StorageResult<MessageRole> {
    match raw {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        "system" => Ok(MessageRole::System),
        other => Err(StorageError::Metadata(format!("unknown message role in database: {other}"))),
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .batch_execute(
                r"
                CREATE TABLE IF NOT EXISTS users (
                    id UUID PRIMARY KEY,
                    static_token TEXT NOT NULL UNIQUE,
                    display_name TEXT NOT NULL,
                    last_seen_at TIMESTAMPTZ
                );

                CREATE TABLE IF NOT EXISTS user_settings (
                    user_id UUID PRIMARY KEY REFERENCES users(id),
                    default_profile TEXT NOT NULL,
                    preferred_model_tier TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS system_prompts (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    content TEXT NOT NULL,
                    active BOOLEAN NOT NULL DEFAULT TRUE
                );

                CREATE TABLE IF NOT EXISTS user_prompts (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id),
                    name TEXT NOT NULL,
                    content TEXT NOT NULL,
                    active BOOLEAN NOT NULL DEFAULT TRUE
                );

                CREATE TABLE IF NOT EXISTS chats (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id),
                    title TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );

                CREATE TABLE IF NOT EXISTS chat_messages (
                    id UUID PRIMARY KEY,
                    chat_id UUID NOT NULL REFERENCES chats(id),
                    role TEXT NOT NULL,
                    content TEXT NOT NULL,
                    message_type TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                );

                CREATE TABLE IF NOT EXISTS chat_images (
                    id UUID PRIMARY KEY,
                    chat_id UUID NOT NULL REFERENCES chats(id),
                    message_id UUID NOT NULL REFERENCES chat_messages(id),
                    file_id UUID,
                    image_type TEXT NOT NULL,
                    description TEXT NOT NULL,
                    width INTEGER,
                    height INTEGER,
                    object_key TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS storage_files (
                    id UUID PRIMARY KEY,
                    chat_id UUID NOT NULL REFERENCES chats(id),
                    object_key TEXT NOT NULL,
                    public_url TEXT,
                    content_type TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tree_nodes (
                    id UUID PRIMARY KEY,
                    client_id UUID,
                    parent_id UUID,
                    node_type TEXT NOT NULL,
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS node_files (
                    id UUID PRIMARY KEY,
                    node_id UUID NOT NULL REFERENCES tree_nodes(id),
                    file_name TEXT NOT NULL,
                    object_key TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS document_results (
                    id UUID PRIMARY KEY,
                    node_id UUID NOT NULL REFERENCES tree_nodes(id),
                    file_type TEXT NOT NULL,
                    object_key TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS document_crops (
                    id UUID PRIMARY KEY,
                    node_id UUID NOT NULL REFERENCES tree_nodes(id),
                    file_name TEXT NOT NULL,
                    object_key TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id);
                CREATE INDEX IF NOT EXISTS idx_chat_messages_chat ON chat_messages(chat_id);
                CREATE INDEX IF NOT EXISTS idx_chat_images_chat ON chat_images(chat_id);
                CREATE INDEX IF NOT EXISTS idx_chat_images_message ON chat_images(message_id);
                CREATE INDEX IF NOT EXISTS idx_storage_files_chat ON storage_files(chat_id);
                CREATE INDEX IF NOT EXISTS idx_tree_nodes_client ON tree_nodes(client_id);
                CREATE INDEX IF NOT EXISTS idx_tree_nodes_parent ON tree_nodes(parent_id);
                CREATE INDEX IF NOT EXISTS idx_node_files_node ON node_files(node_id);
                CREATE INDEX IF NOT EXISTS idx_document_results_node ON document_results(node_id);
                CREATE INDEX IF NOT EXISTS idx_document_crops_node ON document_crops(node_id);
                ",
            )
            .await
            .map_err(Self::map_pg_err)?;

        tracing::info!("metadata store schema initialized");
        Ok(())
    }

    async fn get_user_by_static_token(&self, token: &str) -> StorageResult<Option<User>> {
        let row = self.client.query_opt("SELECT id, static_token, display_name, last_seen_at FROM users WHERE static_token = $1", &[&token]).await.map_err(Self::map_pg_err)?;
        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn get_user_by_id(&self, id: Uuid) -> StorageResult<Option<User>> {
        let row = self.client.query_opt("SELECT id, static_token, display_name, last_seen_at FROM users WHERE id = $1", &[&id]).await.map_err(Self::map_pg_err)?;
        Ok(row.as_ref().map(Self::row_to_user))
    }

    async fn update_user_last_seen(&self, id: Uuid) -> StorageResult<()> {
        self.client.execute("UPDATE users SET last_seen_at = now() WHERE id = $1", &[&id]).await.map_err(Self::map_pg_err)?;
        Ok(())
    }

    async fn get_user_settings(&self, user_id: Uuid) -> StorageResult<Option<UserSettings>> {
        let row = self.client.query_opt("SELECT user_id, default_profile, preferred_model_tier FROM user_settings WHERE user_id = $1", &[&user_id]).await.map_err(Self::map_pg_err)?;
        Ok(row.as_ref().map(Self::row_to_settings))
    }

    async fn create_default_settings(&self, user_id: Uuid) -> StorageResult<UserSettings> {
        let settings = UserSettings::default_for(user_id);
        self.client
            .execute(
                "INSERT INTO user_settings (user_id, default_profile, preferred_model_tier) VALUES ($1, $2, $3) ON CONFLICT (user_id) DO NOTHING",
                &[&settings.user_id, &settings.default_profile, &settings.preferred_model_tier],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Ok(settings)
    }

    async fn update_user_settings(&self, settings: &UserSettings) -> StorageResult<()> {
        self.client
            .execute(
                r"
                INSERT INTO user_settings (user_id, default_profile, preferred_model_tier)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id) DO UPDATE SET
                    default_profile = EXCLUDED.default_profile,
                    preferred_model_tier = EXCLUDED.preferred_model_tier
                ",
                &[&settings.user_id, &settings.default_profile, &settings.preferred_model_tier],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Ok(())
    }

    async fn get_system_prompts(&self, active_only: bool) -> StorageResult<Vec<SystemPrompt>> {
        let query = if active_only { "SELECT id, name, content, active FROM system_prompts WHERE active" } else { "SELECT id, name, content, active FROM system_prompts" };
        let rows = self.client.query(query, &[]).await.map_err(Self::map_pg_err)?;
        Ok(rows.iter().map(|row| SystemPrompt { id: row.get(0), name: row.get(1), content: row.get(2), active: row.get(3) }).collect())
    }

    async fn get_system_prompt_by_name(&self, name: &str) -> StorageResult<Option<SystemPrompt>> {
        let row = self.client.query_opt("SELECT id, name, content, active FROM system_prompts WHERE name = $1", &[&name]).await.map_err(Self::map_pg_err)?;
        Ok(row.map(|row| SystemPrompt { id: row.get(0), name: row.get(1), content: row.get(2), active: row.get(3) }))
    }

    async fn get_user_prompts(&self, user_id: Uuid, active_only: bool) -> StorageResult<Vec<UserPrompt>> {
        let query = if active_only {
            "SELECT id, user_id, name, content, active FROM user_prompts WHERE user_id = $1 AND active"
        } else {
            "SELECT id, user_id, name, content, active FROM user_prompts WHERE user_id = $1"
        };
        let rows = self.client.query(query, &[&user_id]).await.map_err(Self::map_pg_err)?;
        Ok(rows.iter().map(|row| UserPrompt { id: row.get(0), user_id: row.get(1), name: row.get(2), content: row.get(3), active: row.get(4) }).collect())
    }

    async fn get_user_prompt_by_id(&self, id: Uuid) -> StorageResult<Option<UserPrompt>> {
        let row = self.client.query_opt("SELECT id, user_id, name, content, active FROM user_prompts WHERE id = $1", &[&id]).await.map_err(Self::map_pg_err)?;
        Ok(row.map(|row| UserPrompt { id: row.get(0), user_id: row.get(1), name: row.get(2), content: row.get(3), active: row.get(4) }))
    }

    async fn create_chat(&self, user_id: Uuid, title: &str) -> StorageResult<Chat> {
        let row = self
            .client
            .query_one(
                "INSERT INTO chats (id, user_id, title) VALUES ($1, $2, $3) RETURNING id, user_id, title, created_at",
                &[&Uuid::new_v4(), &user_id, &title],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Ok(Self::row_to_chat(&row))
    }

    async fn get_chat(&self, chat_id: Uuid) -> StorageResult<Option<Chat>> {
        let row = self.client.query_opt("SELECT id, user_id, title, created_at FROM chats WHERE id = $1", &[&chat_id]).await.map_err(Self::map_pg_err)?;
        Ok(row.as_ref().map(Self::row_to_chat))
    }

    async fn get_user_chats(&self, user_id: Uuid, limit: i64) -> StorageResult<Vec<Chat>> {
        let rows = self
            .client
            .query("SELECT id, user_id, title, created_at FROM chats WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2", &[&user_id, &limit])
            .await
            .map_err(Self::map_pg_err)?;
        Ok(rows.iter().map(Self::row_to_chat).collect())
    }

    async fn delete_chat_cascade(&self, chat_id: Uuid) -> StorageResult<()> {
        self.client.execute("DELETE FROM chat_images WHERE chat_id = $1", &[&chat_id]).await.map_err(Self::map_pg_err)?;
        self.client.execute("DELETE FROM chat_messages WHERE chat_id = $1", &[&chat_id]).await.map_err(Self::map_pg_err)?;
        self.client.execute("DELETE FROM chats WHERE id = $1", &[&chat_id]).await.map_err(Self::map_pg_err)?;
        Ok(())
    }

    async fn add_message(&self, chat_id: Uuid, role: MessageRole, content: &str, message_type: &str) -> StorageResult<ChatMessage> {
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO chat_messages (id, chat_id, role, content, message_type)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, chat_id, role, content, message_type, created_at
                ",
                &[&Uuid::new_v4(), &chat_id, &role_db_str(role), &content, &message_type],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Self::row_to_message(&row)
    }

    async fn get_chat_messages(&self, chat_id: Uuid, limit: i64) -> StorageResult<Vec<ChatMessage>> {
        let rows = self
            .client
            .query(
                "SELECT id, chat_id, role, content, message_type, created_at FROM chat_messages WHERE chat_id = $1 ORDER BY created_at ASC LIMIT $2",
                &[&chat_id, &limit],
            )
            .await
            .map_err(Self::map_pg_err)?;
        rows.iter().map(Self::row_to_message).collect()
    }

    async fn get_last_message(&self, chat_id: Uuid, role: Option<MessageRole>) -> StorageResult<Option<ChatMessage>> {
        let row = match role {
            Some(role) => {
                self.client
                    .query_opt(
                        "SELECT id, chat_id, role, content, message_type, created_at FROM chat_messages WHERE chat_id = $1 AND role = $2 ORDER BY created_at DESC LIMIT 1",
                        &[&chat_id, &role_db_str(role)],
                    )
                    .await
            }
            None => {
                self.client
                    .query_opt(
                        "SELECT id, chat_id, role, content, message_type, created_at FROM chat_messages WHERE chat_id = $1 ORDER BY created_at DESC LIMIT 1",
                        &[&chat_id],
                    )
                    .await
            }
        }
        .map_err(Self::map_pg_err)?;

        row.as_ref().map(Self::row_to_message).transpose()
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
        let row = self
            .client
            .query_one(
                r"
                INSERT INTO chat_images (id, chat_id, message_id, file_id, image_type, description, width, height, object_key)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, chat_id, message_id, file_id, image_type, description, width, height, object_key
                ",
                &[&Uuid::new_v4(), &chat_id, &message_id, &file_id, &image_type, &description, &width.map(|w| w as i32), &height.map(|h| h as i32), &object_key],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Ok(Self::row_to_chat_image(&row))
    }

    async fn get_message_images(&self, message_id: Uuid) -> StorageResult<Vec<ChatImage>> {
        let rows = self
            .client
            .query(
                "SELECT id, chat_id, message_id, file_id, image_type, description, width, height, object_key FROM chat_images WHERE message_id = $1",
                &[&message_id],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Ok(rows.iter().map(Self::row_to_chat_image).collect())
    }

    async fn get_chat_storage_files(&self, chat_id: Uuid) -> StorageResult<Vec<StorageFile>> {
        let rows = self
            .client
            .query("SELECT id, chat_id, object_key, public_url, content_type FROM storage_files WHERE chat_id = $1", &[&chat_id])
            .await
            .map_err(Self::map_pg_err)?;
        Ok(rows.iter().map(|row| StorageFile { id: row.get(0), chat_id: row.get(1), object_key: row.get(2), public_url: row.get(3), content_type: row.get(4) }).collect())
    }

    async fn register_file(&self, chat_id: Uuid, object_key: &str, public_url: Option<&str>, content_type: &str) -> StorageResult<Uuid> {
        let row = self
            .client
            .query_one(
                "INSERT INTO storage_files (id, chat_id, object_key, public_url, content_type) VALUES ($1, $2, $3, $4, $5) RETURNING id",
                &[&Uuid::new_v4(), &chat_id, &object_key, &public_url, &content_type],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Ok(row.get(0))
    }

    async fn list_chat_images(&self, chat_id: Uuid) -> StorageResult<Vec<ChatImage>> {
        let rows = self
            .client
            .query(
                "SELECT id, chat_id, message_id, file_id, image_type, description, width, height, object_key FROM chat_images WHERE chat_id = $1",
                &[&chat_id],
            )
            .await
            .map_err(Self::map_pg_err)?;
        Ok(rows.iter().map(Self::row_to_chat_image).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_db_str_round_trips() {
        for role in [MessageRole::User, MessageRole::Assistant, MessageRole::System] {
            assert_eq!(parse_role(role_db_str(role)).unwrap(), role);
        }
    }

    #[test]
    fn parse_role_rejects_unknown_values() {
        assert!(parse_role("moderator").is_err());
    }
}

//! Domain rows for the metadata store (spec §6, §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doc_agent_common::DocumentArtifactKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub static_token: String,
    pub display_name: String,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub default_profile: String,
    pub preferred_model_tier: String,
}

impl UserSettings {
    #[must_use]
    pub fn default_for(user_id: Uuid) -> Self {
        Self { user_id, default_profile: "simple".to_string(), preferred_model_tier: "flash".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub content: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub message_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatImage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub file_id: Option<Uuid>,
    pub image_type: String,
    pub description: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub object_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub object_key: String,
    pub public_url: Option<String>,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: Uuid,
    pub client_id: Option<Uuid>,
    pub parent_id: Option<Uuid>,
    pub node_type: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeFile {
    pub id: Uuid,
    pub node_id: Uuid,
    pub file_name: String,
    pub object_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentResult {
    pub id: Uuid,
    pub node_id: Uuid,
    pub file_type: DocumentArtifactKind,
    pub object_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCrop {
    pub id: Uuid,
    pub node_id: Uuid,
    pub file_name: String,
    pub object_key: String,
}

/// The `snake_case` wire/db form of a [`DocumentArtifactKind`], matching its
/// `#[serde(rename_all = "snake_case")]` representation.
#[must_use]
pub fn artifact_kind_db_str(kind: DocumentArtifactKind) -> &'static str {
    match kind {
        DocumentArtifactKind::Annotation => "annotation",
        DocumentArtifactKind::OcrHtml => "ocr_html",
        DocumentArtifactKind::ResultMd => "result_md",
        DocumentArtifactKind::ResultJson => "result_json",
        DocumentArtifactKind::CropsFolder => "crops_folder",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_kind_db_str_matches_serde_rename() {
        let json = serde_json::to_string(&DocumentArtifactKind::OcrHtml).unwrap();
        assert_eq!(json, format!("\"{}\"", artifact_kind_db_str(DocumentArtifactKind::OcrHtml)));
    }
}

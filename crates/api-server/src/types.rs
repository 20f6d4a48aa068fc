//! API request and response types (spec §4.1.1, §6).

use doc_agent_common::Profile;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/v1/chats/{chat_id}/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub user_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub document_ids: Vec<Uuid>,
    #[serde(default = "default_profile")]
    pub profile: Profile,
}

fn default_profile() -> Profile {
    Profile::Simple
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCreatedResponse {
    pub chat_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatRequest {
    pub user_id: Uuid,
    #[serde(default = "default_chat_title")]
    pub title: String,
}

fn default_chat_title() -> String {
    "New chat".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_request_defaults_profile_to_simple() {
        let json = r#"{"user_id":"11111111-1111-1111-1111-111111111111","message":"hi"}"#;
        let request: SendMessageRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(request.profile, Profile::Simple));
        assert!(request.document_ids.is_empty());
    }

    #[test]
    fn create_chat_request_defaults_title() {
        let json = r#"{"user_id":"11111111-1111-1111-1111-111111111111"}"#;
        let request: CreateChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.title, "New chat");
    }
}

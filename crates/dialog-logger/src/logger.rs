use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use doc_agent_common::config::DialogLogConfig;

use crate::error::DialogLogResult;

/// Per-chat append-only auditable transcript (spec §6): a product feature
/// distinct from process-wide `tracing` output. Every call opens, appends,
/// and closes the file; nothing is held open between entries, which is what
/// makes concurrent writers on different chats (and best-effort-ordered
/// writers on the same chat) safe without a lock.
pub struct DialogLogger {
    log_dir: PathBuf,
    truncate_chars: usize,
}

impl DialogLogger {
    #[must_use]
    pub fn new(config: &DialogLogConfig) -> Self {
        Self { log_dir: PathBuf::from(&config.log_dir), truncate_chars: config.truncate_chars }
    }

    #[must_use]
    pub fn log_path(&self, chat_id: &str) -> PathBuf {
        log_path(&self.log_dir, chat_id)
    }

    /// Appends a JSON-pretty-printed section.
    pub async fn log_json(&self, chat_id: &str, title: &str, value: &serde_json::Value) -> DialogLogResult<()> {
        let body = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        self.append(chat_id, title, &body).await
    }

    /// Appends a raw-string section.
    pub async fn log_text(&self, chat_id: &str, title: &str, text: &str) -> DialogLogResult<()> {
        self.append(chat_id, title, text).await
    }

    async fn append(&self, chat_id: &str, title: &str, body: &str) -> DialogLogResult<()> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        let truncated = truncate_chars(body, self.truncate_chars);
        let timestamp = chrono::Utc::now().format("%H:%M:%S%.3f");
        let line = format!("[{timestamp}] === {title} ===\n{truncated}\n\n");

        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(self.log_path(chat_id)).await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Removes a chat's log file. Missing files are not an error (the
    /// cascade may run this after an earlier, already-successful deletion).
    pub async fn delete(&self, chat_id: &str) -> DialogLogResult<()> {
        match tokio::fs::remove_file(self.log_path(chat_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn log_path(log_dir: &Path, chat_id: &str) -> PathBuf {
    log_dir.join(format!("llm_dialog_{chat_id}.log"))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}... [truncated]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> DialogLogConfig {
        DialogLogConfig { log_dir: dir.to_string_lossy().into_owned(), truncate_chars: 20 }
    }

    #[tokio::test]
    async fn entries_append_in_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DialogLogger::new(&config(dir.path()));
        logger.log_text("chat-1", "PROMPT", "hello").await.unwrap();
        logger.log_text("chat-1", "RESPONSE", "world").await.unwrap();

        let contents = tokio::fs::read_to_string(logger.log_path("chat-1")).await.unwrap();
        let prompt_pos = contents.find("PROMPT").unwrap();
        let response_pos = contents.find("RESPONSE").unwrap();
        assert!(prompt_pos < response_pos);
        assert!(contents.contains("hello"));
        assert!(contents.contains("world"));
    }

    #[tokio::test]
    async fn long_payload_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DialogLogger::new(&config(dir.path()));
        let long_body = "x".repeat(100);
        logger.log_text("chat-1", "BIG", &long_body).await.unwrap();

        let contents = tokio::fs::read_to_string(logger.log_path("chat-1")).await.unwrap();
        assert!(contents.contains("[truncated]"));
        assert!(!contents.contains(&"x".repeat(100)));
    }

    #[tokio::test]
    async fn json_payload_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DialogLogger::new(&DialogLogConfig { log_dir: dir.path().to_string_lossy().into_owned(), truncate_chars: 4000 });
        logger.log_json("chat-1", "ANSWER", &serde_json::json!({"a": 1})).await.unwrap();

        let contents = tokio::fs::read_to_string(logger.log_path("chat-1")).await.unwrap();
        assert!(contents.contains("\"a\": 1"));
    }

    #[tokio::test]
    async fn delete_of_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DialogLogger::new(&config(dir.path()));
        logger.delete("never-existed").await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_an_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DialogLogger::new(&config(dir.path()));
        logger.log_text("chat-1", "PROMPT", "hi").await.unwrap();
        assert!(logger.log_path("chat-1").exists());
        logger.delete("chat-1").await.unwrap();
        assert!(!logger.log_path("chat-1").exists());
    }
}

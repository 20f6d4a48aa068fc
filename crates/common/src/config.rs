//! Layered application configuration (spec §6).
//!
//! Defaults ⇐ optional config file ⇐ `DOC_AGENT_*` environment variables,
//! following the reference backend's convention of one process-wide config
//! handle built at startup and passed down, rather than read at each call site.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret_key: String,
    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,
    #[serde(default = "default_token_expire_minutes")]
    pub access_token_expire_minutes: u32,
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}
fn default_token_expire_minutes() -> u32 {
    60
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaResolution {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_flash_model")]
    pub default_flash_model: String,
    #[serde(default = "default_pro_model")]
    pub default_pro_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "default_media_resolution")]
    pub media_resolution: MediaResolution,
    #[serde(default)]
    pub thinking_enabled: bool,
    #[serde(default)]
    pub thinking_budget: u32,
}

fn default_flash_model() -> String {
    "flash".to_string()
}
fn default_pro_model() -> String {
    "pro".to_string()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f64 {
    0.2
}
fn default_top_p() -> f64 {
    0.95
}
fn default_media_resolution() -> MediaResolution {
    MediaResolution::Medium
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderingConfig {
    #[serde(default = "default_preview_max_side")]
    pub preview_max_side: u32,
    #[serde(default = "default_preview_max_side")]
    pub zoom_preview_max_side: u32,
    #[serde(default = "default_auto_quadrants_threshold")]
    pub auto_quadrants_threshold: f64,
    #[serde(default = "default_viewport_size")]
    pub viewport_size: u32,
    #[serde(default = "default_viewport_padding")]
    pub viewport_padding: u32,
}

fn default_preview_max_side() -> u32 {
    2000
}
fn default_auto_quadrants_threshold() -> f64 {
    2.5
}
fn default_viewport_size() -> u32 {
    2048
}
fn default_viewport_padding() -> u32 {
    512
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            preview_max_side: default_preview_max_side(),
            zoom_preview_max_side: default_preview_max_side(),
            auto_quadrants_threshold: default_auto_quadrants_threshold(),
            viewport_size: default_viewport_size(),
            viewport_padding: default_viewport_padding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    #[serde(default = "default_max_mb")]
    pub max_mb: u64,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
}

fn default_true() -> bool {
    true
}
fn default_cache_dir() -> String {
    "./data/evidence_cache".to_string()
}
fn default_max_mb() -> u64 {
    2000
}
fn default_ttl_days() -> u64 {
    14
}

impl Default for EvidenceCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: default_cache_dir(),
            max_mb: default_max_mb(),
            ttl_days: default_ttl_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_concurrent() -> usize {
    2
}
fn default_max_size() -> usize {
    50
}
fn default_timeout_seconds() -> u64 {
    300
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_size: default_max_size(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

fn default_max_file_size_mb() -> u64 {
    100
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated in the environment; split at load time.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogLogConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_truncate_chars")]
    pub truncate_chars: usize,
}

fn default_log_dir() -> String {
    "./data/dialog_logs".to_string()
}
fn default_truncate_chars() -> usize {
    4000
}

impl Default for DialogLogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            truncate_chars: default_truncate_chars(),
        }
    }
}

/// Top-level process configuration, built once at startup and handed down as
/// an `Arc<AppConfig>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub rendering: RenderingConfig,
    #[serde(default)]
    pub evidence_cache: EvidenceCacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub dialog_log: DialogLogConfig,
}

impl AppConfig {
    /// Loads configuration from (in increasing priority) built-in defaults,
    /// an optional `config/default.toml`, and `DOC_AGENT_*` environment
    /// variables (double-underscore separated for nested keys, e.g.
    /// `DOC_AGENT_QUEUE__MAX_CONCURRENT=4`). Calls `dotenvy::dotenv()` first
    /// so a local `.env` file populates the environment before the config
    /// layer reads it.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("DOC_AGENT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8080);
        assert!(!cfg.debug);
    }

    #[test]
    fn queue_config_defaults_match_spec() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.max_concurrent, 2);
        assert_eq!(cfg.max_size, 50);
        assert_eq!(cfg.timeout_seconds, 300);
    }

    #[test]
    fn rendering_config_defaults_match_spec() {
        let cfg = RenderingConfig::default();
        assert_eq!(cfg.preview_max_side, 2000);
        assert_eq!(cfg.auto_quadrants_threshold, 2.5);
    }

    #[test]
    fn dialog_log_config_defaults() {
        let cfg = DialogLogConfig::default();
        assert_eq!(cfg.truncate_chars, 4000);
        assert!(!cfg.log_dir.is_empty());
    }
}

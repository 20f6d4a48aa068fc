use doc_agent_common::config::MediaResolution;
use serde::Serialize;

/// User-controllable generation knobs mapped onto every call (spec §4.5).
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// `0` means "let the provider pick its own default".
    pub thinking_budget: u32,
    pub media_resolution: MediaResolution,
}

/// A file handed to the provider by URI, with MIME inferred by suffix when
/// not supplied explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub uri: String,
    pub mime_type: String,
}

impl UploadedFile {
    #[must_use]
    pub fn new(uri: impl Into<String>, mime_type: Option<String>) -> Self {
        let uri = uri.into();
        let mime_type = mime_type.unwrap_or_else(|| infer_mime(&uri));
        Self { uri, mime_type }
    }
}

fn infer_mime(uri: &str) -> String {
    let lower = uri.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png".to_string()
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg".to_string()
    } else if lower.ends_with(".pdf") {
        "application/pdf".to_string()
    } else {
        "application/octet-stream".to_string()
    }
}

/// One chunk of a streaming response (spec §4.5): `thinking | text | done`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Thinking(String),
    Text(String),
    Done { full_content: String, model: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_mime_from_suffix() {
        assert_eq!(UploadedFile::new("x/y.png", None).mime_type, "image/png");
        assert_eq!(UploadedFile::new("x/y.jpeg", None).mime_type, "image/jpeg");
        assert_eq!(UploadedFile::new("x/y.pdf", None).mime_type, "application/pdf");
        assert_eq!(UploadedFile::new("x/y.bin", None).mime_type, "application/octet-stream");
    }

    #[test]
    fn explicit_mime_overrides_inference() {
        let file = UploadedFile::new("x/y.png", Some("image/custom".to_string()));
        assert_eq!(file.mime_type, "image/custom");
    }
}

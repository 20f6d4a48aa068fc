//! Shared error taxonomy (spec §7).
//!
//! Leaf crates define their own `thiserror` enums scoped to their concerns;
//! this module defines the taxonomy every one of them is ultimately
//! classified into when surfaced as an `error` stream event.

use thiserror::Error;

/// The eight error categories enumerated in spec §7. `code()` returns the
/// wire value used in `StreamEvent::Error { code, .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidInput,
    QueueFull,
    QueueTimeout,
    ArtifactMissing,
    LlmSchemaViolation,
    TransientExternal,
    CacheIoError,
    Unknown,
}

impl ErrorCategory {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::QueueFull => "queue_full",
            Self::QueueTimeout => "queue_timeout",
            Self::ArtifactMissing => "artifact_missing",
            Self::LlmSchemaViolation => "llm_schema_violation",
            Self::TransientExternal => "transient_external",
            Self::CacheIoError => "cache_io_error",
            Self::Unknown => "unknown",
        }
    }

    /// Non-fatal categories are skip-and-continue; everything else stops the
    /// pipeline for the current request (spec §7 policy summary).
    #[must_use]
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::ArtifactMissing | Self::CacheIoError)
    }
}

/// Top-level error surfaced at the pipeline boundary and turned into an
/// `error` stream event. Every leaf-crate error type implements
/// `Classify` so the orchestrator can map it without a giant match per call site.
#[derive(Debug, Error)]
#[error("{category:?}: {message}")]
pub struct PipelineError {
    pub category: ErrorCategory,
    pub message: String,
    /// Extra detail only surfaced to clients when `debug` is enabled (spec §7, §6).
    pub debug_detail: Option<String>,
}

impl PipelineError {
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            debug_detail: None,
        }
    }

    #[must_use]
    pub fn with_debug_detail(mut self, detail: impl Into<String>) -> Self {
        self.debug_detail = Some(detail.into());
        self
    }

    /// The message to show a client: generic unless either the category is
    /// not `Unknown` (already safe to show) or `debug` is on.
    #[must_use]
    pub fn client_message(&self, debug: bool) -> String {
        if self.category != ErrorCategory::Unknown || debug {
            self.message.clone()
        } else {
            "an internal error occurred".to_string()
        }
    }
}

/// Implemented by every leaf crate's error enum so the orchestrator can fold
/// heterogeneous errors into the shared taxonomy without per-crate glue code
/// at the call site.
pub trait Classify {
    fn category(&self) -> ErrorCategory;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_missing_and_cache_errors_are_non_fatal() {
        assert!(!ErrorCategory::ArtifactMissing.is_fatal());
        assert!(!ErrorCategory::CacheIoError.is_fatal());
        assert!(ErrorCategory::QueueFull.is_fatal());
        assert!(ErrorCategory::LlmSchemaViolation.is_fatal());
    }

    #[test]
    fn client_message_is_generic_unless_debug_or_known() {
        let err = PipelineError::new(ErrorCategory::Unknown, "raw panic detail");
        assert_eq!(err.client_message(false), "an internal error occurred");
        assert_eq!(err.client_message(true), "raw panic detail");

        let err = PipelineError::new(ErrorCategory::QueueFull, "queue is full");
        assert_eq!(err.client_message(false), "queue is full");
    }
}

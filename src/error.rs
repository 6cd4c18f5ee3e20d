//! Pipeline error taxonomy.
//!
//! # Design Decisions
//! - Every failure the pipeline can observe maps to a response or a metric;
//!   nothing here is fatal to the process
//! - Request-level failures carry enough detail to render a JSON body
//! - `CapacityExceeded` is connection-level: the transport closes the socket

use serde_json::json;

/// Errors produced while processing a request.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The request failed one or more size/shape checks.
    #[error("request validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    /// The multipart body could not be parsed.
    #[error("malformed upload: {0}")]
    MalformedUpload(String),

    /// The multipart body carries more parts than allowed.
    #[error("too many parts: {count} exceeds limit of {max}")]
    TooManyParts { count: usize, max: usize },

    /// A single file part is larger than the per-file limit.
    #[error("file '{name}' is {size} bytes, limit is {max}")]
    FileTooLarge { name: String, size: usize, max: u64 },

    /// The combined size of all file parts exceeds the batch limit.
    #[error("upload is {total} bytes, limit is {max}")]
    UploadTooLarge { total: u64, max: u64 },

    /// The connection registry is full.
    #[error("connection capacity of {max} exceeded")]
    CapacityExceeded { max: usize },

    /// The application handler or a middleware hook failed.
    #[error("{0}")]
    Handler(String),

    /// Transport I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// HTTP status the error is surfaced with.
    pub fn status(&self) -> u16 {
        match self {
            PipelineError::Validation(_)
            | PipelineError::MalformedUpload(_)
            | PipelineError::TooManyParts { .. }
            | PipelineError::FileTooLarge { .. }
            | PipelineError::UploadTooLarge { .. } => 400,
            PipelineError::CapacityExceeded { .. } => 503,
            PipelineError::Handler(_) | PipelineError::Io(_) => 500,
        }
    }

    /// Whether the error originated from upload parsing or validation.
    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedUpload(_)
                | PipelineError::TooManyParts { .. }
                | PipelineError::FileTooLarge { .. }
                | PipelineError::UploadTooLarge { .. }
        )
    }

    /// Structured JSON body for the error response.
    pub fn to_json(&self) -> Vec<u8> {
        let value = match self {
            PipelineError::Validation(errors) => json!({
                "error": "Invalid request",
                "errors": errors,
            }),
            PipelineError::Handler(message) => json!({ "error": message }),
            other if other.is_upload() => json!({
                "error": "Invalid upload",
                "detail": other.to_string(),
            }),
            other => json!({ "error": other.to_string() }),
        };
        serde_json::to_vec(&value).unwrap_or_else(|_| br#"{"error":"internal"}"#.to_vec())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, intervals > 0)
//! - Reject compression encodings the writer cannot produce
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.connections.max_connections == 0 {
        errors.push(ValidationError::new("connections.max_connections", "must be greater than 0"));
    }
    if config.connections.keep_alive_timeout_ms == 0 {
        errors.push(ValidationError::new("connections.keep_alive_timeout_ms", "must be greater than 0"));
    }
    if config.connections.sweep_interval_ms == 0 {
        errors.push(ValidationError::new("connections.sweep_interval_ms", "must be greater than 0"));
    }

    match config.compression.encoding.as_str() {
        "gzip" => {}
        "" => errors.push(ValidationError::new("compression.encoding", "must not be empty")),
        other => errors.push(ValidationError::new(
            "compression.encoding",
            format!("unsupported encoding '{}'", other),
        )),
    }

    if config.security.max_uri_length == 0 {
        errors.push(ValidationError::new("security.max_uri_length", "must be greater than 0"));
    }

    if config.upload.max_file_count == 0 {
        errors.push(ValidationError::new("upload.max_file_count", "must be greater than 0"));
    }
    if config.upload.max_file_size == 0 {
        errors.push(ValidationError::new("upload.max_file_size", "must be greater than 0"));
    }

    if config.sessions.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("sessions.sweep_interval_secs", "must be greater than 0"));
    }
    if config.sessions.cookie_name.trim().is_empty() {
        errors.push(ValidationError::new("sessions.cookie_name", "must not be empty"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

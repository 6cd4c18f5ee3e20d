//! Response compression decision and codec.
//!
//! The decision is a pure function of body length, content type and
//! configuration. Content-type matching is a case-sensitive prefix or
//! substring test, so `Text/HTML` is not compressed.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::config::CompressionConfig;

/// Outcome of [`decide`]. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionDecision {
    pub should_compress: bool,
    pub encoding: String,
}

/// Whether a body qualifies for compression.
///
/// True iff `enabled`, the body is strictly longer than `threshold`, and the
/// content type starts with `text/` or contains `json`, `xml` or `javascript`.
pub fn should_compress(
    body_len: usize,
    content_type: Option<&str>,
    enabled: bool,
    threshold: usize,
) -> bool {
    enabled && body_len > threshold && content_type.is_some_and(is_compressible)
}

fn is_compressible(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
        || content_type.contains("javascript")
}

/// Decision for one response. `override_enabled` replaces the configured
/// switch when the handler set one.
pub fn decide(
    body_len: usize,
    content_type: Option<&str>,
    override_enabled: Option<bool>,
    config: &CompressionConfig,
) -> CompressionDecision {
    let enabled = override_enabled.unwrap_or(config.enabled);
    CompressionDecision {
        should_compress: should_compress(body_len, content_type, enabled, config.threshold),
        encoding: config.encoding.clone(),
    }
}

/// Gzip-encode `data`.
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

//! `multipart/form-data` parsing.
//!
//! The body is split on every literal occurrence of `--boundary`. The bytes
//! between two consecutive delimiters form one raw part: a CRLF, the part
//! headers, a blank line, the part data and a trailing CRLF. A delimiter
//! followed by `--` ends the body.
//!
//! Delimiters are not escaped. File data that happens to contain
//! `--boundary` is split at that point, exactly like any other delimiter.
//! Producers are expected to pick a boundary that does not occur in the data.

use std::collections::HashMap;

use crate::error::{PipelineError, Result};

/// One parsed part. A part without `filename` is a plain field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadedPart {
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Parts in submission order plus the plain fields by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadBatch {
    parts: Vec<UploadedPart>,
    fields: HashMap<String, String>,
}

impl UploadBatch {
    fn push(&mut self, part: UploadedPart) {
        if !part.is_file() {
            self.fields.insert(
                part.name.clone(),
                String::from_utf8_lossy(&part.data).into_owned(),
            );
        }
        self.parts.push(part);
    }

    pub fn parts(&self) -> &[UploadedPart] {
        &self.parts
    }

    pub fn files(&self) -> impl Iterator<Item = &UploadedPart> {
        self.parts.iter().filter(|p| p.is_file())
    }

    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn total_file_size(&self) -> u64 {
        self.files().map(|p| p.data.len() as u64).sum()
    }
}

/// Pull the boundary token out of a `Content-Type` header value.
pub fn extract_boundary(content_type: &str) -> Result<String> {
    let (_, rest) = content_type
        .split_once("boundary=")
        .ok_or_else(|| PipelineError::MalformedUpload("missing boundary".into()))?;
    let boundary = rest
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches('"');
    if boundary.is_empty() {
        return Err(PipelineError::MalformedUpload("empty boundary".into()));
    }
    Ok(boundary.to_string())
}

/// Splits a multipart body into parts.
#[derive(Debug, Clone)]
pub struct MultipartParser {
    max_parts: usize,
}

impl Default for MultipartParser {
    fn default() -> Self {
        Self { max_parts: 10 }
    }
}

impl MultipartParser {
    pub fn new(max_parts: usize) -> Self {
        Self { max_parts }
    }

    pub fn parse(&self, body: &[u8], boundary: &str) -> Result<UploadBatch> {
        if boundary.is_empty() {
            return Err(PipelineError::MalformedUpload("empty boundary".into()));
        }
        let delimiter = format!("--{}", boundary).into_bytes();
        let mut batch = UploadBatch::default();

        let Some(mut start) = find(body, &delimiter, 0).map(|at| at + delimiter.len()) else {
            return Ok(batch);
        };

        while let Some(end) = find(body, &delimiter, start) {
            let raw = &body[start..end];
            if raw.starts_with(b"--") {
                break;
            }
            if let Some(part) = parse_part(raw) {
                if batch.len() == self.max_parts {
                    return Err(PipelineError::TooManyParts {
                        count: batch.len() + 1,
                        max: self.max_parts,
                    });
                }
                batch.push(part);
            }
            start = end + delimiter.len();
        }

        Ok(batch)
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn parse_part(raw: &[u8]) -> Option<UploadedPart> {
    let raw = raw.strip_prefix(b"\r\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r\n").unwrap_or(raw);

    let split = find(raw, b"\r\n\r\n", 0)?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let data = &raw[split + 4..];

    let mut disposition = None;
    let mut content_type = None;
    for line in head.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("content-disposition") {
            disposition = Some(value.trim().to_string());
        } else if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let params = disposition_params(&disposition?);
    Some(UploadedPart {
        name: params.get("name").cloned()?,
        filename: params.get("filename").cloned(),
        content_type,
        data: data.to_vec(),
    })
}

/// Parameters of a `form-data; name="a"; filename="b"` disposition value.
fn disposition_params(value: &str) -> HashMap<String, String> {
    value
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .map(|(k, v)| {
            (
                k.trim().to_ascii_lowercase(),
                v.trim().trim_matches('"').to_string(),
            )
        })
        .collect()
}

//! Upload validation and the pluggable upload handler.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;

use crate::config::UploadConfig;
use crate::error::{PipelineError, Result};
use crate::upload::multipart::UploadBatch;

/// Enforce per-file, total and count limits on a parsed batch.
pub fn validate_batch(batch: &UploadBatch, limits: &UploadConfig) -> Result<()> {
    if batch.len() > limits.max_file_count {
        return Err(PipelineError::TooManyParts {
            count: batch.len(),
            max: limits.max_file_count,
        });
    }

    for file in batch.files() {
        if file.size() as u64 > limits.max_file_size {
            return Err(PipelineError::FileTooLarge {
                name: file.filename.clone().unwrap_or_default(),
                size: file.size(),
                max: limits.max_file_size,
            });
        }
    }

    let total = batch.total_file_size();
    if total > limits.max_total_size() {
        return Err(PipelineError::UploadTooLarge {
            total,
            max: limits.max_total_size(),
        });
    }

    Ok(())
}

/// Receives every accepted upload before the application handler runs.
pub trait UploadHandler: Send + Sync + 'static {
    fn handle<'a>(&'a self, batch: &'a UploadBatch) -> BoxFuture<'a, Result<()>>;
}

/// Writes every file part into a directory.
///
/// Only the final path component of the client-supplied filename is used,
/// so `../../etc/passwd` is stored as `passwd`.
#[derive(Debug, Clone)]
pub struct TempDirUploadHandler {
    directory: PathBuf,
}

impl TempDirUploadHandler {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn destination(&self, filename: &str) -> Option<PathBuf> {
        let name = Path::new(filename).file_name()?;
        Some(self.directory.join(name))
    }
}

impl UploadHandler for TempDirUploadHandler {
    fn handle<'a>(&'a self, batch: &'a UploadBatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for file in batch.files() {
                let filename = file.filename.as_deref().unwrap_or_default();
                let Some(dest) = self.destination(filename) else {
                    tracing::warn!(field = %file.name, filename, "Skipping upload without usable filename");
                    continue;
                };
                tokio::fs::write(&dest, &file.data).await?;
                tracing::debug!(path = ?dest, size = file.size(), "Stored uploaded file");
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::multipart::MultipartParser;

    fn batch_with_files(sizes: &[usize]) -> UploadBatch {
        let mut body = Vec::new();
        for (i, size) in sizes.iter().enumerate() {
            body.extend_from_slice(
                format!(
                    "--b\r\nContent-Disposition: form-data; name=\"f{i}\"; filename=\"f{i}.bin\"\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend(std::iter::repeat(b'x').take(*size));
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"--b--\r\n");
        MultipartParser::new(usize::MAX).parse(&body, "b").unwrap()
    }

    fn limits(max_file_size: u64, max_file_count: usize) -> UploadConfig {
        UploadConfig {
            max_file_size,
            max_file_count,
            directory: None,
        }
    }

    #[test]
    fn accepts_batch_within_limits() {
        assert!(validate_batch(&batch_with_files(&[10, 20]), &limits(20, 2)).is_ok());
    }

    #[test]
    fn rejects_oversized_file() {
        let err = validate_batch(&batch_with_files(&[10, 21]), &limits(20, 5)).unwrap_err();
        assert!(matches!(err, PipelineError::FileTooLarge { ref name, size: 21, max: 20 } if name == "f1.bin"));
    }

    #[test]
    fn rejects_too_many_parts() {
        let err = validate_batch(&batch_with_files(&[1, 1, 1]), &limits(20, 2)).unwrap_err();
        assert!(matches!(err, PipelineError::TooManyParts { count: 3, max: 2 }));
    }

    #[tokio::test]
    async fn stores_files_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let handler = TempDirUploadHandler::new(dir.path());
        let body = b"--b\r\nContent-Disposition: form-data; name=\"f\"; filename=\"../../evil.txt\"\r\n\r\nhi\r\n--b--";
        let batch = MultipartParser::default().parse(body, "b").unwrap();

        handler.handle(&batch).await.unwrap();
        let stored = std::fs::read(dir.path().join("evil.txt")).unwrap();
        assert_eq!(stored, b"hi");
    }
}

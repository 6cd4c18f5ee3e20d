//! Upload subsystem.
//!
//! # Data Flow
//! ```text
//! multipart/form-data request
//!     → multipart.rs (boundary extraction, part splitting)
//!     → handler.rs::validate_batch (size and count limits)
//!     → UploadHandler (pluggable; default stores files on disk)
//!     → batch attached to the request for the application handler
//! ```
//!
//! Any failure stops processing with a 400 before middleware runs, except
//! an I/O failure inside the upload handler, which is a 500.

pub mod handler;
pub mod multipart;

pub use handler::{validate_batch, TempDirUploadHandler, UploadHandler};
pub use multipart::{extract_boundary, MultipartParser, UploadBatch, UploadedPart};

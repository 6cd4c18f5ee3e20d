//! HTTP request/response enhancement pipeline.
//!
//! Sits between a transport that splits bytes into requests and the
//! application handlers: validation, multipart uploads, connection and
//! session tracking, middleware, and a compressing/streaming writer.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod net;
pub mod pool;

// Request enhancements
pub mod security;
pub mod session;
pub mod upload;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServerConfig;
pub use error::PipelineError;
pub use http::Pipeline;
pub use lifecycle::Shutdown;

//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → validator.rs (URI length/characters, header count, body size)
//!     → 400 with every violation listed, or pass to uploads/middleware
//! ```
//!
//! # Design Decisions
//! - Checks are side-effect free and independent
//! - Fail closed: reject on any failing check
//! - Limits come from `SecurityConfig` and follow config reloads

pub mod validator;

pub use validator::RequestValidator;

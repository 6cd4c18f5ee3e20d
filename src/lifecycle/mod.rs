//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl-C → trigger → listener stops accepting, sweepers exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - In-flight connections finish on their own tasks

pub mod shutdown;

pub use shutdown::{ctrl_c, Shutdown};

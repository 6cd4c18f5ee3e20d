//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, wire parsing, keep-alive)
//!     → registry.rs (admission against max_connections, activity tracking)
//!     → Hand off each request to the HTTP pipeline
//!
//! Background:
//!     ticker → registry sweep → evict connections idle past keep-alive
//! ```
//!
//! # Design Decisions
//! - A full registry closes the socket; no HTTP response is possible
//! - Closing a connection always unregisters it (drop guard)
//! - The sweep is the backstop for connections abandoned mid-request

pub mod connection;
pub mod listener;
pub mod registry;

pub use connection::{ConnectionId, ConnectionRecord};
pub use listener::{Listener, ListenerError};
pub use registry::{ConnectionRegistry, ConnectionStats};

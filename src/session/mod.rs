//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Request carrying the session cookie
//!     → store.rs::get (lazy create)
//!     → session id exposed on the request
//!     → handler reads/writes attributes through the store
//!
//! Background:
//!     ticker → sweep_expired → remove sessions idle past the timeout
//! ```
//!
//! # Design Decisions
//! - Sessions live in memory only
//! - The pipeline keeps the id, never the record, across requests
//! - Each eviction is a single `remove_if`, no lock held for the full scan

pub mod store;

pub use store::{session_cookie, Session, SessionStore};

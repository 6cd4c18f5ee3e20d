//! HTTP request/response enhancement subsystem.
//!
//! # Data Flow
//! ```text
//! Transport (any RequestSurface)
//!     → request.rs (copy into pooled Request, lazy header/query/cookie maps)
//!     → server.rs (validate → upload → session → middleware chain → handler)
//!     → writer.rs (compression decision, byte-exact headers, gzip or stream)
//!     → Transport (any AsyncWrite)
//! ```
//!
//! # Design Decisions
//! - The core never owns a socket: input is a trait, output is `AsyncWrite`
//! - Request and response instances are pooled and reset between uses
//! - Date and header-name bytes come from process-wide caches

pub mod compression;
pub mod cookie;
pub mod date;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod writer;

pub use compression::{should_compress, CompressionDecision};
pub use cookie::{parse_cookie_header, Cookie, CookieBuilder};
pub use middleware::{handler_fn, BoxError, Handler, HandlerResult, Middleware, TraceMiddleware};
pub use request::{RawRequest, Request, RequestSurface};
pub use response::{BodySender, Response, StreamClosed};
pub use server::Pipeline;
pub use writer::{ResponseWriter, StreamingWriter, STREAM_BUFFER_SIZE};

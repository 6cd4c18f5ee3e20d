//! Outgoing response built by middleware and handlers.
//!
//! # Responsibilities
//! - Hold status, ordered headers, cookies and the buffered body
//! - Switch into streaming mode and hand out a [`BodySender`]
//! - Reset cleanly for pool reuse
//!
//! Serialization lives in [`crate::http::writer`].

use serde::Serialize;
use tokio::sync::mpsc;

use crate::http::cookie::Cookie;
use crate::pool::Reset;

/// An outgoing HTTP response.
#[derive(Debug)]
pub struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    body: Vec<u8>,
    compression: Option<bool>,
    stream: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            cookies: Vec::new(),
            body: Vec::new(),
            compression: None,
            stream: None,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// Set a header, replacing any existing value with the same name.
    /// A replaced header keeps its original position.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
        self
    }

    /// Append a header, keeping any existing values.
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Explicitly set headers in the order they were set.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.set_header("Content-Type", content_type)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Register a cookie. Each cookie becomes one `Set-Cookie` line.
    pub fn add_cookie(&mut self, cookie: Cookie) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Append bytes to the buffered body.
    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        self.body.extend_from_slice(bytes);
        self
    }

    /// Replace the buffered body.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.body = body.into();
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }

    /// Replace the body with `body` as `text/plain; charset=utf-8`.
    pub fn text(&mut self, body: impl Into<String>) -> &mut Self {
        self.set_content_type("text/plain; charset=utf-8");
        self.set_body(body.into().into_bytes())
    }

    /// Replace the body with raw JSON bytes.
    pub fn json_bytes(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.set_content_type("application/json");
        self.set_body(body)
    }

    /// Serialize `value` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> serde_json::Result<&mut Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.json_bytes(bytes))
    }

    /// Override the configured compression switch for this response only.
    pub fn enable_compression(&mut self, enabled: bool) -> &mut Self {
        self.compression = Some(enabled);
        self
    }

    pub fn compression_override(&self) -> Option<bool> {
        self.compression
    }

    /// Switch to streaming mode.
    ///
    /// Headers are written without `Content-Length` and the body is whatever
    /// was buffered so far followed by every chunk sent through the returned
    /// sender. The stream ends when all senders are dropped. Calling this
    /// again replaces the previous stream.
    pub fn enable_streaming(&mut self) -> BodySender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.stream = Some(rx);
        BodySender { tx }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub(crate) fn take_stream(&mut self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.stream.take()
    }

    /// Discard everything the handler produced and render `body` as a JSON
    /// error with `status`. Cookies are dropped too.
    pub fn replace_with_error(&mut self, status: u16, body: Vec<u8>) {
        self.reset();
        self.status = status;
        self.json_bytes(body);
    }
}

impl Reset for Response {
    fn reset(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.cookies.clear();
        self.body.clear();
        self.compression = None;
        self.stream = None;
    }
}

/// Handle for emitting streaming body chunks.
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// The response has already been written or abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response stream closed")]
pub struct StreamClosed;

impl BodySender {
    pub fn send(&self, chunk: impl Into<Vec<u8>>) -> Result<(), StreamClosed> {
        self.tx.send(chunk.into()).map_err(|_| StreamClosed)
    }
}

/// Reason phrase for the status line.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        411 => "Length Required",
        413 => "Content Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "",
    }
}

//! Response serialization.
//!
//! # Header Layout
//! ```text
//! HTTP/1.1 <status> <reason>
//! Date: <IMF-fixdate>
//! Server: <server name>
//! Set-Cookie: ...            (one per cookie, registration order)
//! <explicit headers>         (set order; Content-Encoding / Content-Length
//!                             appended here when the writer adds them)
//! <blank line>
//! ```
//!
//! Buffered responses may be gzip-compressed; streaming responses never are
//! and carry no `Content-Length`.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::config::CompressionConfig;
use crate::http::compression;
use crate::http::date;
use crate::http::response::{reason_phrase, Response};

const CRLF: &[u8] = b"\r\n";
const FIELD_SEP: &[u8] = b": ";

/// Streaming writers flush to the transport once this many bytes are buffered.
pub const STREAM_BUFFER_SIZE: usize = 8 * 1024;

static NAME_CACHE: OnceLock<DashMap<String, Arc<[u8]>>> = OnceLock::new();

/// Encoded header name, cached for the lifetime of the process.
fn header_name(name: &str) -> Arc<[u8]> {
    let cache = NAME_CACHE.get_or_init(DashMap::new);
    if let Some(bytes) = cache.get(name) {
        return Arc::clone(bytes.value());
    }
    let bytes: Arc<[u8]> = Arc::from(name.as_bytes());
    cache.insert(name.to_string(), Arc::clone(&bytes));
    bytes
}

fn push_field(dst: &mut Vec<u8>, name: &str, value: &[u8]) {
    dst.extend_from_slice(&header_name(name));
    dst.extend_from_slice(FIELD_SEP);
    dst.extend_from_slice(value);
    dst.extend_from_slice(CRLF);
}

/// Serializes [`Response`]s onto a transport.
#[derive(Debug, Clone)]
pub struct ResponseWriter {
    server_name: String,
    compression: CompressionConfig,
}

impl ResponseWriter {
    pub fn new(server_name: impl Into<String>, compression: CompressionConfig) -> Self {
        Self {
            server_name: server_name.into(),
            compression,
        }
    }

    /// Render the header block for `resp`.
    pub fn serialize_head(&self, resp: &Response) -> Vec<u8> {
        let mut head = Vec::with_capacity(256);

        head.extend_from_slice(b"HTTP/1.1 ");
        head.extend_from_slice(resp.status().to_string().as_bytes());
        head.push(b' ');
        head.extend_from_slice(reason_phrase(resp.status()).as_bytes());
        head.extend_from_slice(CRLF);

        let mut now = Vec::with_capacity(date::DATE_VALUE_LENGTH);
        date::extend(&mut now);
        push_field(&mut head, "Date", &now);
        push_field(&mut head, "Server", self.server_name.as_bytes());

        for cookie in resp.cookies() {
            push_field(&mut head, "Set-Cookie", cookie.to_set_cookie().as_bytes());
        }
        for (name, value) in resp.headers() {
            push_field(&mut head, name, value.as_bytes());
        }
        head.extend_from_slice(CRLF);
        head
    }

    /// Write `resp` to `out`, returning the number of bytes written.
    ///
    /// The response's body and stream are consumed; headers and cookies are
    /// left in place.
    pub async fn write<W>(&self, resp: &mut Response, out: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        if resp.is_streaming() {
            return self.write_streaming(resp, out).await;
        }

        let mut body = resp.take_body();
        let decision = compression::decide(
            body.len(),
            resp.content_type(),
            resp.compression_override(),
            &self.compression,
        );
        if decision.should_compress {
            body = compression::gzip(&body)?;
            resp.set_header("Content-Encoding", decision.encoding);
        }

        if resp.header("content-length").is_none() {
            resp.set_header("Content-Length", body.len().to_string());
        }

        let head = self.serialize_head(resp);
        out.write_all(&head).await?;
        out.write_all(&body).await?;
        out.flush().await?;

        Ok(head.len() + body.len())
    }

    async fn write_streaming<W>(&self, resp: &mut Response, out: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let mut stream = resp.take_stream();
        let initial = resp.take_body();

        resp.remove_header("content-length");
        let head = self.serialize_head(resp);
        out.write_all(&head).await?;
        out.flush().await?;

        let mut writer = StreamingWriter::new(out);
        writer.write(&initial).await?;
        if let Some(rx) = stream.as_mut() {
            while let Some(chunk) = rx.recv().await {
                writer.write(&chunk).await?;
            }
        }
        let body_len = writer.close().await?;

        Ok(head.len() + body_len)
    }
}

/// Buffered body writer for streaming responses.
pub struct StreamingWriter<'a, W> {
    out: &'a mut W,
    buffer: Vec<u8>,
    written: usize,
    closed: bool,
}

impl<'a, W: AsyncWrite + Unpin> StreamingWriter<'a, W> {
    pub fn new(out: &'a mut W) -> Self {
        Self {
            out,
            buffer: Vec::with_capacity(STREAM_BUFFER_SIZE),
            written: 0,
            closed: false,
        }
    }

    /// Buffer `data`, flushing once the buffer reaches [`STREAM_BUFFER_SIZE`].
    pub async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        if self.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "streaming writer closed",
            ));
        }
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= STREAM_BUFFER_SIZE {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send everything buffered to the transport.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.out.write_all(&self.buffer).await?;
            self.written += self.buffer.len();
            self.buffer.clear();
        }
        self.out.flush().await
    }

    /// Flush and close. Returns the total number of body bytes written.
    pub async fn close(&mut self) -> std::io::Result<usize> {
        if !self.closed {
            self.flush().await?;
            self.closed = true;
        }
        Ok(self.written)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::cookie::Cookie;

    fn writer() -> ResponseWriter {
        ResponseWriter::new("test-server", CompressionConfig::default())
    }

    fn split_head(raw: &[u8]) -> (String, Vec<u8>) {
        let pos = raw.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        (
            String::from_utf8(raw[..pos + 4].to_vec()).unwrap(),
            raw[pos + 4..].to_vec(),
        )
    }

    #[tokio::test]
    async fn header_order_is_fixed() {
        let mut resp = Response::new();
        resp.set_header("X-First", "1");
        resp.add_cookie(Cookie::new("a", "1"));
        resp.set_header("Content-Type", "image/png");
        resp.add_cookie(Cookie::builder("b", "2").http_only(true).build());
        resp.set_body(vec![0u8; 3]);

        let mut out = Vec::new();
        writer().write(&mut resp, &mut out).await.unwrap();
        let (head, body) = split_head(&out);
        let lines: Vec<&str> = head.split("\r\n").collect();

        assert_eq!(lines[0], "HTTP/1.1 200 OK");
        assert!(lines[1].starts_with("Date: ") && lines[1].ends_with(" GMT"));
        assert_eq!(lines[2], "Server: test-server");
        assert_eq!(lines[3], "Set-Cookie: a=1; Path=/");
        assert_eq!(lines[4], "Set-Cookie: b=2; Path=/; HttpOnly");
        assert_eq!(lines[5], "X-First: 1");
        assert_eq!(lines[6], "Content-Type: image/png");
        assert_eq!(lines[7], "Content-Length: 3");
        assert_eq!(&lines[8..], &["", ""]);
        assert_eq!(body, vec![0u8; 3]);
    }

    #[tokio::test]
    async fn explicit_content_length_is_kept() {
        let mut resp = Response::new();
        resp.set_header("Content-Length", "0");
        resp.set_body(b"abc".to_vec());

        let mut out = Vec::new();
        writer().write(&mut resp, &mut out).await.unwrap();
        let (head, _) = split_head(&out);
        assert_eq!(head.matches("Content-Length").count(), 1);
        assert!(head.contains("Content-Length: 0\r\n"));
    }

    #[tokio::test]
    async fn large_json_is_gzipped() {
        let json = format!(r#"{{"data":"{}"}}"#, "x".repeat(2048));
        let mut resp = Response::new();
        resp.json_bytes(json.clone().into_bytes());

        let mut out = Vec::new();
        writer().write(&mut resp, &mut out).await.unwrap();
        let (head, body) = split_head(&out);

        assert!(head.contains("Content-Encoding: gzip\r\n"));
        assert!(head.contains(&format!("Content-Length: {}\r\n", body.len())));
        assert!(body.len() < json.len());
    }

    #[tokio::test]
    async fn per_response_override_disables_compression() {
        let mut resp = Response::new();
        resp.text("y".repeat(4096));
        resp.enable_compression(false);

        let mut out = Vec::new();
        writer().write(&mut resp, &mut out).await.unwrap();
        let (head, body) = split_head(&out);
        assert!(!head.contains("Content-Encoding"));
        assert_eq!(body.len(), 4096);
    }

    #[tokio::test]
    async fn streaming_omits_length_and_compression() {
        let mut resp = Response::new();
        resp.set_content_type("text/plain");
        resp.write(b"head-");
        let tx = resp.enable_streaming();
        tx.send("z".repeat(5000)).unwrap();
        tx.send("tail").unwrap();
        drop(tx);

        let mut out = Vec::new();
        let written = writer().write(&mut resp, &mut out).await.unwrap();
        let (head, body) = split_head(&out);

        assert_eq!(written, out.len());
        assert!(!head.contains("Content-Length"));
        assert!(!head.contains("Content-Encoding"));
        assert_eq!(body.len(), 5 + 5000 + 4);
        assert!(body.starts_with(b"head-"));
        assert!(body.ends_with(b"tail"));
    }

    #[tokio::test]
    async fn streaming_writer_flushes_at_threshold() {
        let mut out = Vec::new();
        let mut sw = StreamingWriter::new(&mut out);
        sw.write(&[1u8; STREAM_BUFFER_SIZE - 1]).await.unwrap();
        assert_eq!(sw.buffered(), STREAM_BUFFER_SIZE - 1);
        sw.write(&[2u8]).await.unwrap();
        assert_eq!(sw.buffered(), 0);
        sw.write(b"rest").await.unwrap();
        assert_eq!(sw.close().await.unwrap(), STREAM_BUFFER_SIZE + 4);
        assert!(sw.write(b"late").await.is_err());
        assert_eq!(out.len(), STREAM_BUFFER_SIZE + 4);
    }
}

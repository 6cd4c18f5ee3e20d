//! TCP transport adapter.
//!
//! # Responsibilities
//! - Bind to the configured address and accept connections
//! - Register every connection, closing it when the registry is full
//! - Split the byte stream into requests with `httparse`
//! - Run each request through the [`Pipeline`] and write the response
//! - Keep connections alive between requests until idle or closed
//!
//! Only identity bodies framed by `Content-Length` are read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::{ListenerConfig, SecurityConfig};
use crate::error::PipelineError;
use crate::http::{Pipeline, RequestSurface, Response};
use crate::net::connection::ConnectionId;
use crate::net::registry::ConnectionRegistry;
use crate::security::validator::{BODY_TOO_LARGE, TOO_MANY_HEADERS};

/// Header slots offered to the wire parser. Requests with more fields than
/// this are rejected before reaching the pipeline.
const MAX_WIRE_HEADERS: usize = 128;
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to bind: {0}")]
    Bind(std::io::Error),
    #[error("Failed to accept: {0}")]
    Accept(std::io::Error),
}

#[derive(Debug, thiserror::Error)]
enum ReadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed request: {0}")]
    Parse(#[from] httparse::Error),
    #[error("connection closed mid-request")]
    Truncated,
    #[error("declared body of {declared} bytes exceeds the transport limit")]
    BodyTooLarge { declared: u64 },
}

/// A request as split off the wire.
#[derive(Debug, Default)]
pub struct ParsedRequest {
    method: String,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    content_length: Option<u64>,
    body: Vec<u8>,
    http10: bool,
    body_skipped: bool,
}

impl ParsedRequest {
    /// Whether the client asked to close after this exchange.
    fn wants_close(&self) -> bool {
        match self.header("connection") {
            Some(v) if v.eq_ignore_ascii_case("close") => true,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => false,
            _ => self.http10,
        }
    }
}

impl RequestSurface for ParsedRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn header_fields(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn header_count(&self) -> usize {
        self.headers.len()
    }

    fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind(&config.bind_address)
            .await
            .map_err(ListenerError::Bind)?;
        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %local_addr, "Listener bound");
        Ok(Self { inner })
    }

    pub fn from_listener(inner: TcpListener) -> Self {
        Self { inner }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept connections until shutdown. Each connection runs on its own task.
    pub async fn serve(
        self,
        pipeline: Arc<Pipeline>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        loop {
            tokio::select! {
                accepted = self.inner.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };
                    let pipeline = Arc::clone(&pipeline);
                    tokio::spawn(async move {
                        handle_connection(pipeline, stream, peer).await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("Listener received shutdown signal, no longer accepting");
                    return Ok(());
                }
            }
        }
    }
}

/// Unregisters its connection on every exit path.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

async fn handle_connection<S>(pipeline: Arc<Pipeline>, mut stream: S, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = ConnectionId::new().to_string();
    if let Err(e) = pipeline.connections().register(&id, &peer.to_string()) {
        tracing::warn!(connection_id = %id, peer = %peer, error = %e, "Connection refused");
        return;
    }
    let _registration = Registration {
        registry: Arc::clone(pipeline.connections()),
        id: id.clone(),
    };

    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut served = 0u64;

    loop {
        let config = pipeline.config();
        let wait = if served == 0 {
            config.connections.connection_timeout()
        } else {
            config.connections.keep_alive_timeout()
        };

        let parsed = match read_with_timeout(&mut stream, &mut buf, &config.security, wait).await {
            Some(Ok(Some(parsed))) => parsed,
            Some(Ok(None)) => break,
            Some(Err(ReadError::Parse(httparse::Error::TooManyHeaders))) => {
                let err = PipelineError::Validation(vec![TOO_MANY_HEADERS.to_string()]);
                reject(&pipeline, &mut stream, err).await;
                break;
            }
            Some(Err(ReadError::BodyTooLarge { declared })) => {
                tracing::debug!(connection_id = %id, declared, "Declared body refused");
                let err = PipelineError::Validation(vec![BODY_TOO_LARGE.to_string()]);
                reject(&pipeline, &mut stream, err).await;
                break;
            }
            Some(Err(ReadError::Parse(e))) => {
                let err = PipelineError::Validation(vec![format!("Malformed request: {e}")]);
                reject(&pipeline, &mut stream, err).await;
                break;
            }
            Some(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "Read failed");
                break;
            }
            None => {
                tracing::debug!(connection_id = %id, "Connection idle timeout");
                break;
            }
        };
        // The sweep may have evicted this connection while it sat idle or
        // while the previous response was being written.
        if !pipeline.connections().contains(&id) {
            tracing::debug!(connection_id = %id, "Connection evicted, closing");
            break;
        }
        served += 1;

        let (mut req, mut resp) = pipeline.acquire();
        req.fill_from(&parsed);
        pipeline.process(&id, &mut req, &mut resp).await;

        let close = parsed.wants_close() || parsed.body_skipped || resp.is_streaming();
        if close {
            resp.set_header("Connection", "close");
        }

        match pipeline.writer().write(&mut resp, &mut stream).await {
            Ok(written) => {
                pipeline.metrics().record_bytes_written(written);
                pipeline.connections().touch(&id);
            }
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Write failed");
                break;
            }
        }
        if close {
            break;
        }
    }

    tracing::debug!(connection_id = %id, requests = served, "Connection closed");
}

async fn read_with_timeout<R>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    limits: &SecurityConfig,
    wait: Duration,
) -> Option<Result<Option<ParsedRequest>, ReadError>>
where
    R: AsyncRead + Unpin,
{
    time::timeout(wait, read_request(stream, buf, limits)).await.ok()
}

/// Read one request. `Ok(None)` is a clean close between requests. Bytes
/// past the end of the request stay in `buf` for the next call.
async fn read_request<R>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    limits: &SecurityConfig,
) -> Result<Option<ParsedRequest>, ReadError>
where
    R: AsyncRead + Unpin,
{
    let (mut parsed, head_len) = loop {
        if !buf.is_empty() {
            if let Some(done) = parse_head(buf)? {
                break done;
            }
        }
        if fill(stream, buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(ReadError::Truncated)
            };
        }
    };

    let declared = parsed.content_length.unwrap_or(0);
    if declared > limits.max_body_size {
        if !limits.enabled {
            return Err(ReadError::BodyTooLarge { declared });
        }
        // The validator reports the oversized body; the connection closes
        // after the response because the body was never consumed.
        parsed.body_skipped = true;
        buf.clear();
        return Ok(Some(parsed));
    }

    let end = usize::try_from(declared)
        .ok()
        .and_then(|len| head_len.checked_add(len))
        .ok_or(ReadError::BodyTooLarge { declared })?;
    while buf.len() < end {
        if fill(stream, buf).await? == 0 {
            return Err(ReadError::Truncated);
        }
    }
    parsed.body = buf[head_len..end].to_vec();
    buf.drain(..end);
    Ok(Some(parsed))
}

async fn fill<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    let mut chunk = [0u8; READ_CHUNK];
    let n = stream.read(&mut chunk).await?;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

fn parse_head(buf: &[u8]) -> Result<Option<(ParsedRequest, usize)>, httparse::Error> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_WIRE_HEADERS];
    let mut wire = httparse::Request::new(&mut slots);
    let head_len = match wire.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let target = wire.path.unwrap_or_default();
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p, Some(q.to_string())),
        None => (target, None),
    };
    let headers: Vec<(String, String)> = wire
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok());

    let parsed = ParsedRequest {
        method: wire.method.unwrap_or_default().to_string(),
        path: path.to_string(),
        query,
        headers,
        content_length,
        body: Vec::new(),
        http10: wire.version == Some(0),
        body_skipped: false,
    };
    Ok(Some((parsed, head_len)))
}

async fn reject<W: AsyncWrite + Unpin>(pipeline: &Pipeline, out: &mut W, err: PipelineError) {
    let mut resp = Response::new();
    resp.replace_with_error(err.status(), err.to_json());
    resp.set_header("Connection", "close");
    pipeline.metrics().record_error("validation");
    pipeline.metrics().record_request(resp.status());
    if let Ok(written) = pipeline.writer().write(&mut resp, out).await {
        pipeline.metrics().record_bytes_written(written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::http::middleware::{boxed, handler_fn, Handler};
    use serde_json::Value;
    use tokio::io::AsyncWriteExt;

    fn ok_handler() -> impl Handler {
        handler_fn(|_req, resp| {
            boxed(async move {
                resp.text("ok");
                Ok(Value::Null)
            })
        })
    }

    /// Read one response produced by `ok_handler`.
    async fn read_ok_response<R: AsyncRead + Unpin>(client: &mut R) -> String {
        let mut out = Vec::new();
        let mut chunk = [0u8; 1024];
        while !out.ends_with(b"\r\n\r\nok") {
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the response completed");
            out.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    #[tokio::test]
    async fn reads_pipelined_requests() {
        let raw = b"POST /a?x=1 HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\nHost: h\r\n\r\n";
        let mut input = &raw[..];
        let mut buf = Vec::new();
        let limits = SecurityConfig::default();

        let first = read_request(&mut input, &mut buf, &limits).await.unwrap().unwrap();
        assert_eq!(first.method(), "POST");
        assert_eq!(first.path(), "/a");
        assert_eq!(first.query(), Some("x=1"));
        assert_eq!(first.body(), b"abc");

        let second = read_request(&mut input, &mut buf, &limits).await.unwrap().unwrap();
        assert_eq!(second.path(), "/b");
        assert!(second.body().is_empty());

        assert!(read_request(&mut input, &mut buf, &limits).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_body_is_not_read() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 99999999\r\n\r\n";
        let mut input = &raw[..];
        let mut buf = Vec::new();

        let parsed = read_request(&mut input, &mut buf, &SecurityConfig::default())
            .await
            .unwrap()
            .unwrap();
        assert!(parsed.body_skipped);
        assert_eq!(parsed.content_length(), Some(99_999_999));
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        let mut input = &raw[..];
        let mut buf = Vec::new();
        let err = read_request(&mut input, &mut buf, &SecurityConfig::default()).await;
        assert!(matches!(err, Err(ReadError::Truncated)));
    }

    #[tokio::test]
    async fn declared_length_is_bounded_with_security_off() {
        let limits = SecurityConfig {
            enabled: false,
            ..SecurityConfig::default()
        };
        for raw in [
            &b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nabc"[..],
            &b"POST / HTTP/1.1\r\nContent-Length: 10485761\r\n\r\nabc"[..],
        ] {
            let mut input = raw;
            let mut buf = Vec::new();
            let result = read_request(&mut input, &mut buf, &limits).await;
            assert!(matches!(result, Err(ReadError::BodyTooLarge { .. })));
        }
    }

    #[tokio::test]
    async fn huge_declared_length_gets_400_over_the_wire() {
        let mut config = ServerConfig::default();
        config.security.enabled = false;
        let pipeline = Arc::new(Pipeline::new(config, ok_handler()));
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(Arc::clone(&pipeline), server, peer()));

        client
            .write_all(b"POST / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\nabc")
            .await
            .unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();

        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.contains(BODY_TOO_LARGE));
        assert_eq!(pipeline.connections().stats().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_connection_is_closed_unserved() {
        let mut config = ServerConfig::default();
        config.connections.max_connections = 1;
        let pipeline = Arc::new(Pipeline::new(config, ok_handler()));
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(Arc::clone(&pipeline), server, peer()));

        while pipeline.connections().stats().active == 0 {
            tokio::task::yield_now().await;
        }
        // Silent past keep-alive but inside the first-request window.
        time::advance(Duration::from_secs(35)).await;
        assert_eq!(pipeline.connections().sweep_idle(), 1);
        pipeline.connections().register("conn-other", "127.0.0.1:4001").unwrap();

        client
            .write_all(b"GET / HTTP/1.1\r\nHost: t\r\n\r\n")
            .await
            .unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();

        assert!(out.is_empty());
        assert_eq!(pipeline.metrics().snapshot().total_requests, 0);
        assert_eq!(pipeline.connections().stats().active, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn served_connection_stays_tracked_across_keep_alive() {
        let pipeline = Arc::new(Pipeline::new(ServerConfig::default(), ok_handler()));
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(handle_connection(Arc::clone(&pipeline), server, peer()));

        for _ in 0..2 {
            time::advance(Duration::from_secs(20)).await;
            client
                .write_all(b"GET / HTTP/1.1\r\nHost: t\r\n\r\n")
                .await
                .unwrap();
            let response = read_ok_response(&mut client).await;
            assert!(response.starts_with("HTTP/1.1 200 OK"));
            assert_eq!(pipeline.connections().sweep_idle(), 0);
        }

        drop(client);
        task.await.unwrap();
        assert_eq!(pipeline.connections().stats().active, 0);
    }

    #[test]
    fn connection_close_semantics() {
        let (http11, _) = parse_head(b"GET / HTTP/1.1\r\n\r\n").unwrap().unwrap();
        assert!(!http11.wants_close());
        let (closing, _) = parse_head(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap().unwrap();
        assert!(closing.wants_close());
        let (http10, _) = parse_head(b"GET / HTTP/1.0\r\n\r\n").unwrap().unwrap();
        assert!(http10.wants_close());
    }
}

//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use enhanced_http::http::middleware::boxed;
use enhanced_http::http::{handler_fn, Handler, Pipeline, Response};
use enhanced_http::net::Listener;
use enhanced_http::{ServerConfig, Shutdown};

pub const BOUNDARY: &str = "----enhancedhttptestboundary";

/// Handler that answers every request with `{"path": ..., "files": n}`.
pub fn echo_handler() -> impl Handler {
    handler_fn(|req, resp| {
        boxed(async move {
            let files = req.upload().map(|u| u.files().count()).unwrap_or(0);
            let body = serde_json::json!({ "path": req.path(), "files": files });
            resp.json(&body)?;
            Ok(body)
        })
    })
}

/// Bind an ephemeral port and serve `pipeline` on it.
pub async fn start_server(pipeline: Arc<Pipeline>) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = Listener::from_listener(listener).serve(pipeline, rx).await;
    });
    (addr, shutdown)
}

/// Config with metrics on and the exporter untouched.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config
}

/// Build a `multipart/form-data` body from `(name, filename, data)` triples.
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(f) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Serialize a response the way the listener would and split head from body.
pub async fn render(pipeline: &Pipeline, resp: &mut Response) -> (String, Vec<u8>) {
    let mut out = Vec::new();
    pipeline.writer().write(resp, &mut out).await.unwrap();
    split_response(&out)
}

pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let at = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head terminator");
    (
        String::from_utf8_lossy(&raw[..at + 2]).into_owned(),
        raw[at + 4..].to_vec(),
    )
}

/// Send raw bytes and read until the server closes the connection.
pub async fn roundtrip_raw(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut out = Vec::new();
    let _ = stream.read_to_end(&mut out).await;
    out
}

pub fn json_body(raw: &[u8]) -> Value {
    serde_json::from_slice(raw).unwrap()
}

//! The request/response enhancement pipeline.
//!
//! # Responsibilities
//! - Touch the connection record for every request
//! - Reject invalid requests before any handler code runs
//! - Parse, limit and hand off multipart uploads
//! - Resolve the session named by the session cookie
//! - Run the middleware chain and the application handler
//! - Provide the writer matching the current configuration
//!
//! Shared state (registry, sessions, metrics) is behind `Arc` so the
//! listener and background sweepers can hold it too.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{ServerConfig, UploadConfig};
use crate::error::{PipelineError, Result};
use crate::http::middleware::{Chain, ChainOutcome, Handler, Middleware};
use crate::http::request::{Request, RequestSurface};
use crate::http::response::Response;
use crate::http::writer::ResponseWriter;
use crate::net::ConnectionRegistry;
use crate::observability::ServerMetrics;
use crate::pool::{ObjectPool, Pooled};
use crate::security::RequestValidator;
use crate::session::SessionStore;
use crate::upload::{validate_batch, MultipartParser, TempDirUploadHandler, UploadHandler};

/// Idle request/response instances kept per pool.
const POOL_IDLE: usize = 256;

pub struct Pipeline {
    config: ArcSwap<ServerConfig>,
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionStore>,
    metrics: Arc<ServerMetrics>,
    chain: Chain,
    upload_handler: Arc<dyn UploadHandler>,
    requests: Arc<ObjectPool<Request>>,
    responses: Arc<ObjectPool<Response>>,
}

impl Pipeline {
    pub fn new(config: ServerConfig, handler: impl Handler) -> Self {
        let metrics = Arc::new(ServerMetrics::new(config.observability.metrics_enabled));
        Self::with_metrics(config, handler, metrics)
    }

    /// Build on an existing metrics sink, so stores created before the
    /// pipeline report into the same counters.
    pub fn with_metrics(config: ServerConfig, handler: impl Handler, metrics: Arc<ServerMetrics>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new(
            config.connections.max_connections,
            config.connections.keep_alive_timeout(),
            Arc::clone(&metrics),
        ));
        let sessions = Arc::new(SessionStore::new(
            config.sessions.timeout(),
            Arc::clone(&metrics),
        ));
        let upload_handler = Arc::new(TempDirUploadHandler::new(config.upload.directory()));

        Self {
            chain: Chain::new(Arc::new(handler), Arc::clone(&metrics)),
            config: ArcSwap::from_pointee(config),
            connections,
            sessions,
            metrics,
            upload_handler,
            requests: ObjectPool::new(POOL_IDLE),
            responses: ObjectPool::new(POOL_IDLE),
        }
    }

    /// Append a middleware; hooks run in the order they were added.
    pub fn with_middleware(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(Arc::new(middleware));
        self
    }

    pub fn with_upload_handler(mut self, handler: impl UploadHandler) -> Self {
        self.upload_handler = Arc::new(handler);
        self
    }

    /// Share an existing store, e.g. one the handler also holds.
    pub fn with_session_store(mut self, sessions: Arc<SessionStore>) -> Self {
        sessions.set_timeout(self.config.load().sessions.timeout());
        self.sessions = sessions;
        self
    }

    pub fn config(&self) -> Arc<ServerConfig> {
        self.config.load_full()
    }

    /// Swap in a new configuration. Connection capacity and keep-alive stay
    /// as they were at start-up.
    pub fn reload(&self, config: ServerConfig) {
        self.sessions.set_timeout(config.sessions.timeout());
        self.config.store(Arc::new(config));
        tracing::info!("Pipeline configuration reloaded");
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    pub fn writer(&self) -> ResponseWriter {
        let config = self.config.load();
        ResponseWriter::new(
            config.listener.server_name.clone(),
            config.compression.clone(),
        )
    }

    /// Pooled request/response pair, returned to the pools on drop.
    pub fn acquire(&self) -> (Pooled<Request>, Pooled<Response>) {
        (self.requests.acquire(), self.responses.acquire())
    }

    /// Convenience wrapper over [`Pipeline::process`] for callers that
    /// hold a raw surface and want an owned response.
    pub async fn handle<S>(&self, conn_id: &str, surface: &S) -> Response
    where
        S: RequestSurface + ?Sized,
    {
        let mut req = Request::from_surface(surface);
        let mut resp = Response::new();
        self.process(conn_id, &mut req, &mut resp).await;
        resp
    }

    /// Run one request through validation, upload handling and the chain.
    pub async fn process(&self, conn_id: &str, req: &mut Request, resp: &mut Response) {
        let config = self.config.load_full();
        self.connections.touch(conn_id);
        self.metrics.record_bytes_read(req.body().len());

        if config.security.enabled {
            let violations = RequestValidator::new(&config.security).explain(&*req);
            if !violations.is_empty() {
                tracing::debug!(connection_id = conn_id, path = %req.path(), ?violations, "Request rejected");
                self.reject(resp, PipelineError::Validation(violations));
                return;
            }
        }

        if req.is_multipart() {
            if let Err(err) = self.accept_upload(req, &config.upload).await {
                tracing::warn!(connection_id = conn_id, error = %err, "Upload rejected");
                self.reject(resp, err);
                return;
            }
        }

        if let Some(id) = req.cookie(&config.sessions.cookie_name).map(str::to_owned) {
            let session = self.sessions.get(&id);
            req.set_session_id(session.id().to_string());
        }

        if let ChainOutcome::Vetoed { by } = self.chain.execute(req, resp).await {
            tracing::debug!(connection_id = conn_id, middleware = %by, status = resp.status(), "Request vetoed");
        }
        self.metrics.record_request(resp.status());
    }

    async fn accept_upload(&self, req: &mut Request, limits: &UploadConfig) -> Result<()> {
        let boundary = req.boundary()?;
        let batch = MultipartParser::new(limits.max_file_count).parse(req.body(), &boundary)?;
        validate_batch(&batch, limits)?;
        self.upload_handler.handle(&batch).await?;
        tracing::debug!(parts = batch.len(), bytes = batch.total_file_size(), "Upload accepted");
        req.set_upload(batch);
        Ok(())
    }

    fn reject(&self, resp: &mut Response, err: PipelineError) {
        let kind = match &err {
            PipelineError::Validation(_) => "validation",
            e if e.is_upload() => "upload",
            _ => "io",
        };
        resp.replace_with_error(err.status(), err.to_json());
        self.metrics.record_error(kind);
        self.metrics.record_request(resp.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::{boxed, handler_fn};
    use crate::http::RawRequest;
    use serde_json::{json, Value};

    fn echo_path() -> impl Handler {
        handler_fn(|req, resp| {
            boxed(async move {
                resp.text(req.path().to_string());
                Ok(Value::Null)
            })
        })
    }

    #[tokio::test]
    async fn valid_request_reaches_handler() {
        let pipeline = Pipeline::new(ServerConfig::default(), echo_path());
        let resp = pipeline.handle("c1", &RawRequest::new("GET", "/hello")).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body(), b"/hello");
        assert_eq!(pipeline.metrics().snapshot().total_requests, 1);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_handler() {
        let pipeline = Pipeline::new(ServerConfig::default(), echo_path());
        let req = RawRequest::new("GET", "/<script>");
        let resp = pipeline.handle("c1", &req).await;

        assert_eq!(resp.status(), 400);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["errors"], json!(["URI contains illegal characters"]));
        assert_eq!(pipeline.metrics().snapshot().total_errors, 1);
    }

    #[tokio::test]
    async fn security_checks_can_be_disabled() {
        let mut config = ServerConfig::default();
        config.security.enabled = false;
        let pipeline = Pipeline::new(config, echo_path());
        let resp = pipeline.handle("c1", &RawRequest::new("GET", "/<ok>")).await;
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn session_cookie_resolves_session() {
        let handler = handler_fn(|req, resp| {
            boxed(async move {
                resp.text(req.session_id().unwrap_or("none").to_string());
                Ok(Value::Null)
            })
        });
        let pipeline = Pipeline::new(ServerConfig::default(), handler);
        let req = RawRequest::new("GET", "/").header("Cookie", "theme=dark; SESSIONID=abc");

        let resp = pipeline.handle("c1", &req).await;
        assert_eq!(resp.body(), b"abc");
        assert!(pipeline.sessions().contains("abc"));
    }

    #[tokio::test]
    async fn shared_store_reports_into_pipeline_metrics() {
        let metrics = Arc::new(ServerMetrics::new(true));
        let sessions = Arc::new(SessionStore::new(
            std::time::Duration::from_secs(60),
            Arc::clone(&metrics),
        ));
        let pipeline = Pipeline::with_metrics(ServerConfig::default(), echo_path(), metrics)
            .with_session_store(Arc::clone(&sessions));

        sessions.create();
        let req = RawRequest::new("GET", "/").header("Cookie", "SESSIONID=abc");
        pipeline.handle("c1", &req).await;

        let snapshot = pipeline.metrics().snapshot();
        assert_eq!(snapshot.active_sessions, 2);
        assert_eq!(snapshot.total_requests, 1);
    }

    #[tokio::test]
    async fn reload_changes_limits() {
        let pipeline = Pipeline::new(ServerConfig::default(), echo_path());
        let mut config = ServerConfig::default();
        config.security.max_uri_length = 3;
        pipeline.reload(config);

        let resp = pipeline.handle("c1", &RawRequest::new("GET", "/abcd")).await;
        assert_eq!(resp.status(), 400);
    }
}

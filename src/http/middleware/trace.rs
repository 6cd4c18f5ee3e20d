//! Request logging middleware.

use serde_json::Value;

use crate::http::middleware::{BoxError, Middleware};
use crate::http::request::Request;
use crate::http::response::Response;

/// Logs every request on entry and its status on completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceMiddleware;

impl Middleware for TraceMiddleware {
    fn name(&self) -> &str {
        "trace"
    }

    fn before(&self, req: &mut Request, _resp: &mut Response) -> Result<bool, BoxError> {
        tracing::debug!(
            method = %req.method(),
            path = %req.path(),
            session = req.session_id().unwrap_or("-"),
            "Request received"
        );
        Ok(true)
    }

    fn after(&self, req: &Request, resp: &mut Response, _result: &Value) -> Result<(), BoxError> {
        tracing::info!(
            method = %req.method(),
            path = %req.path(),
            status = resp.status(),
            "Request completed"
        );
        Ok(())
    }
}

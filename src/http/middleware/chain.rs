//! Middleware chain execution with a single failure boundary.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;

use crate::error::PipelineError;
use crate::http::middleware::{Handler, Middleware};
use crate::http::request::Request;
use crate::http::response::Response;
use crate::observability::ServerMetrics;

/// How a request left the chain.
#[derive(Debug)]
pub enum ChainOutcome {
    /// Handler and every after hook ran.
    Completed(Value),
    /// A before hook returned `false`.
    Vetoed { by: String },
    /// A hook or the handler failed; the response now carries a 500.
    Failed(PipelineError),
}

pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
    handler: Arc<dyn Handler>,
    metrics: Arc<ServerMetrics>,
}

impl Chain {
    pub fn new(handler: Arc<dyn Handler>, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            middlewares: Vec::new(),
            handler,
            metrics,
        }
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run hooks and handler. Never returns an error: failures are written
    /// into `resp` and reported as [`ChainOutcome::Failed`].
    pub async fn execute(&self, req: &mut Request, resp: &mut Response) -> ChainOutcome {
        match self.run(req, resp).await {
            Ok(outcome) => outcome,
            Err(message) => {
                tracing::error!(path = %req.path(), error = %message, "Request failed in middleware chain");
                let err = PipelineError::Handler(message);
                resp.replace_with_error(err.status(), err.to_json());
                self.metrics.record_error("handler");
                ChainOutcome::Failed(err)
            }
        }
    }

    async fn run(&self, req: &mut Request, resp: &mut Response) -> Result<ChainOutcome, String> {
        for mw in &self.middlewares {
            let proceed = panic::catch_unwind(AssertUnwindSafe(|| mw.before(req, resp)))
                .map_err(panic_message)?
                .map_err(|e| e.to_string())?;
            if !proceed {
                tracing::debug!(middleware = mw.name(), "Request vetoed");
                return Ok(ChainOutcome::Vetoed {
                    by: mw.name().to_string(),
                });
            }
        }

        let req: &Request = req;
        let result = AssertUnwindSafe(self.handler.call(req, resp))
            .catch_unwind()
            .await
            .map_err(panic_message)?
            .map_err(|e| e.to_string())?;

        for mw in &self.middlewares {
            panic::catch_unwind(AssertUnwindSafe(|| mw.after(req, resp, &result)))
                .map_err(panic_message)?
                .map_err(|e| e.to_string())?;
        }

        Ok(ChainOutcome::Completed(result))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

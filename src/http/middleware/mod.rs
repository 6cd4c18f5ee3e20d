//! Handlers and the middleware chain.
//!
//! # Data Flow
//! ```text
//! before hooks (registration order)
//!     → first `Ok(false)` vetoes: handler and after hooks skipped
//!     → application handler
//!     → after hooks (registration order) with the handler's result
//!
//! Any error or panic from a hook or the handler
//!     → caught once in chain.rs
//!     → 500 with {"error": "<message>"} and an error metric
//! ```

pub mod chain;
pub mod trace;

use std::future::Future;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::http::request::Request;
use crate::http::response::Response;

pub use chain::{Chain, ChainOutcome};
pub use trace::TraceMiddleware;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Opaque handler result handed to every `after` hook.
pub type HandlerResult = Result<Value, BoxError>;

/// Application handler.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, req: &'a Request, resp: &'a mut Response) -> BoxFuture<'a, HandlerResult>;
}

/// Adapter turning a closure into a [`Handler`].
pub struct HandlerFn<F>(F);

/// Wrap a closure returning a boxed future:
///
/// ```ignore
/// handler_fn(|req, resp| Box::pin(async move {
///     resp.text(req.path().to_string());
///     Ok(serde_json::Value::Null)
/// }))
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, req: &'a Request, resp: &'a mut Response) -> BoxFuture<'a, HandlerResult> {
        (self.0)(req, resp)
    }
}

/// Before/after hooks around the application handler.
pub trait Middleware: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Return `Ok(false)` to stop the chain. The hook owns the response in
    /// that case.
    fn before(&self, req: &mut Request, resp: &mut Response) -> Result<bool, BoxError> {
        let _ = (req, resp);
        Ok(true)
    }

    fn after(&self, req: &Request, resp: &mut Response, result: &Value) -> Result<(), BoxError> {
        let _ = (req, resp, result);
        Ok(())
    }
}

/// Box a future for use with [`handler_fn`].
pub fn boxed<'a, F>(fut: F) -> BoxFuture<'a, HandlerResult>
where
    F: Future<Output = HandlerResult> + Send + 'a,
{
    Box::pin(fut)
}

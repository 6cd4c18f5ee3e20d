//! Request surface and the enhanced request handed to handlers.
//!
//! # Responsibilities
//! - Define the narrow interface consumed from the wire parser
//! - Copy one parsed request into a reusable [`Request`]
//! - Lazily derive header, query and cookie maps
//! - Carry per-request pipeline state (path params, session id, upload)
//!
//! # Design Decisions
//! - Header lookup is case-insensitive; derived maps keep the last value
//!   for a repeated key
//! - Derived maps are computed on first access and dropped on reset

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::http::cookie::parse_cookie_header;
use crate::pool::Reset;
use crate::upload::UploadBatch;

/// A parsed request as exposed by the transport's wire parser.
pub trait RequestSurface {
    fn method(&self) -> &str;

    /// URI path without the query string.
    fn path(&self) -> &str;

    /// Raw query string, without the leading `?`.
    fn query(&self) -> Option<&str>;

    /// Case-insensitive header lookup. Returns the first match.
    fn header(&self, name: &str) -> Option<&str>;

    /// All header fields in wire order.
    fn header_fields(&self) -> Vec<(&str, &str)>;

    fn header_count(&self) -> usize;

    /// Declared `Content-Length`, if any.
    fn content_length(&self) -> Option<u64>;

    fn body(&self) -> &[u8];
}

/// The request seen by middleware and handlers.
#[derive(Debug, Default)]
pub struct Request {
    method: String,
    path: String,
    query: Option<String>,
    headers: Vec<(String, String)>,
    content_length: Option<u64>,
    body: Vec<u8>,

    header_map: OnceLock<HashMap<String, String>>,
    query_params: OnceLock<HashMap<String, String>>,
    cookies: OnceLock<HashMap<String, String>>,
    path_params: HashMap<String, String>,

    session_id: Option<String>,
    upload: Option<UploadBatch>,
}

impl Request {
    /// Build a request from a surface in one step.
    pub fn from_surface<S: RequestSurface + ?Sized>(surface: &S) -> Self {
        let mut req = Self::default();
        req.fill_from(surface);
        req
    }

    /// Copy a parsed request into this instance, reusing its allocations.
    pub fn fill_from<S: RequestSurface + ?Sized>(&mut self, surface: &S) {
        self.reset();
        self.method.push_str(surface.method());
        self.path.push_str(surface.path());
        self.query = surface.query().map(str::to_owned);
        self.headers.extend(
            surface
                .header_fields()
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned())),
        );
        self.content_length = surface.content_length();
        self.body.extend_from_slice(surface.body());
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// All headers with lower-cased names.
    pub fn headers(&self) -> &HashMap<String, String> {
        self.header_map.get_or_init(|| {
            self.headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect()
        })
    }

    /// Decoded query parameters. Pairs without `=` are dropped.
    pub fn query_params(&self) -> &HashMap<String, String> {
        self.query_params.get_or_init(|| match self.query.as_deref() {
            Some(q) if !q.is_empty() => parse_query(q),
            _ => HashMap::new(),
        })
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params().get(name).map(String::as_str)
    }

    /// Cookies sent in the `Cookie` header.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| {
            self.header("cookie")
                .map(parse_cookie_header)
                .unwrap_or_default()
        })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    pub fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.starts_with("multipart/form-data"))
    }

    /// Multipart boundary declared in `Content-Type`.
    pub fn boundary(&self) -> crate::error::Result<String> {
        let content_type = self.content_type().ok_or_else(|| {
            crate::error::PipelineError::MalformedUpload("missing content type".into())
        })?;
        crate::upload::extract_boundary(content_type)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub(crate) fn set_session_id(&mut self, id: String) {
        self.session_id = Some(id);
    }

    /// Parsed multipart upload, present once the pipeline accepted one.
    pub fn upload(&self) -> Option<&UploadBatch> {
        self.upload.as_ref()
    }

    pub(crate) fn set_upload(&mut self, batch: UploadBatch) {
        self.upload = Some(batch);
    }
}

impl RequestSurface for Request {
    fn method(&self) -> &str {
        Request::method(self)
    }

    fn path(&self) -> &str {
        Request::path(self)
    }

    fn query(&self) -> Option<&str> {
        Request::query(self)
    }

    fn header(&self, name: &str) -> Option<&str> {
        Request::header(self, name)
    }

    fn header_fields(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn header_count(&self) -> usize {
        Request::header_count(self)
    }

    fn content_length(&self) -> Option<u64> {
        Request::content_length(self)
    }

    fn body(&self) -> &[u8] {
        Request::body(self)
    }
}

impl Reset for Request {
    fn reset(&mut self) {
        self.method.clear();
        self.path.clear();
        self.query = None;
        self.headers.clear();
        self.content_length = None;
        self.body.clear();
        self.header_map.take();
        self.query_params.take();
        self.cookies.take();
        self.path_params.clear();
        self.session_id = None;
        self.upload = None;
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| pair.contains('='))
        .flat_map(|pair| url::form_urlencoded::parse(pair.as_bytes()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Owned [`RequestSurface`] for tests and adapters that build requests by hand.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawRequest {
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_owned(), Some(q.to_owned())),
            None => (target.to_owned(), None),
        };
        Self {
            method: method.to_owned(),
            path,
            query,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// Set the body and a matching `Content-Length`.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self.headers
            .retain(|(k, _)| !k.eq_ignore_ascii_case("content-length"));
        self.headers
            .push(("Content-Length".to_owned(), self.body.len().to_string()));
        self
    }
}

impl RequestSurface for RawRequest {
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
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

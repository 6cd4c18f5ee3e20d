//! Request size and shape checks.
//!
//! # Checks
//! - URI path non-empty and at most `max_uri_length` bytes
//! - At most `max_header_count` header fields
//! - Declared content length at most `max_body_size`
//! - URI path free of control characters (0x00-0x1F), `<` and `>`
//!
//! Every check runs on every call; `explain` lists each failing check and
//! `validate` is true only when the list is empty.

use crate::config::SecurityConfig;
use crate::http::RequestSurface;

pub const URI_EMPTY: &str = "URI is empty";
pub const URI_TOO_LONG: &str = "URI too long";
pub const TOO_MANY_HEADERS: &str = "Too many headers";
pub const BODY_TOO_LARGE: &str = "Body too large";
pub const ILLEGAL_CHARACTERS: &str = "URI contains illegal characters";

/// Stateless validator over a parsed request.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    max_uri_length: usize,
    max_header_count: usize,
    max_body_size: u64,
}

impl RequestValidator {
    pub fn new(limits: &SecurityConfig) -> Self {
        Self {
            max_uri_length: limits.max_uri_length,
            max_header_count: limits.max_header_count,
            max_body_size: limits.max_body_size,
        }
    }

    pub fn validate<R: RequestSurface + ?Sized>(&self, req: &R) -> bool {
        self.explain(req).is_empty()
    }

    /// Human-readable description of every failing check.
    pub fn explain<R: RequestSurface + ?Sized>(&self, req: &R) -> Vec<String> {
        let mut violations = Vec::new();
        let uri = req.path();

        if uri.is_empty() {
            violations.push(URI_EMPTY.to_string());
        }
        if uri.len() > self.max_uri_length {
            violations.push(URI_TOO_LONG.to_string());
        }
        if req.header_count() > self.max_header_count {
            violations.push(TOO_MANY_HEADERS.to_string());
        }
        if req.content_length().unwrap_or(0) > self.max_body_size {
            violations.push(BODY_TOO_LARGE.to_string());
        }
        if uri.bytes().any(is_illegal) {
            violations.push(ILLEGAL_CHARACTERS.to_string());
        }

        violations
    }
}

impl Default for RequestValidator {
    fn default() -> Self {
        Self::new(&SecurityConfig::default())
    }
}

fn is_illegal(b: u8) -> bool {
    b <= 0x1F || b == b'<' || b == b'>'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RawRequest;

    #[test]
    fn well_formed_request_passes() {
        let req = RawRequest::new("GET", "/api/items?page=2").header("Host", "a");
        let validator = RequestValidator::default();
        assert!(validator.validate(&req));
        assert!(validator.explain(&req).is_empty());
    }

    #[test]
    fn long_uri_is_reported() {
        let req = RawRequest::new("GET", &format!("/{}", "a".repeat(2999)));
        let validator = RequestValidator::default();
        assert!(!validator.validate(&req));
        assert_eq!(validator.explain(&req), vec![URI_TOO_LONG.to_string()]);
    }

    #[test]
    fn all_failures_are_listed() {
        let mut req = RawRequest::new("POST", "");
        for i in 0..101 {
            req = req.header(&format!("X-H{i}"), "v");
        }
        let req = req.header("Content-Length", &(11 * 1024 * 1024).to_string());

        let violations = RequestValidator::default().explain(&req);
        assert_eq!(
            violations,
            vec![URI_EMPTY.to_string(), TOO_MANY_HEADERS.to_string(), BODY_TOO_LARGE.to_string()]
        );
    }

    #[test]
    fn control_characters_and_angle_brackets_are_rejected() {
        let validator = RequestValidator::default();
        for path in ["/a\u{0}b", "/a\tb", "/<script>", "/x>y"] {
            let req = RawRequest::new("GET", path);
            assert_eq!(validator.explain(&req), vec![ILLEGAL_CHARACTERS.to_string()], "{path:?}");
        }
    }

    #[test]
    fn limits_come_from_config() {
        let validator = RequestValidator::new(&SecurityConfig {
            max_uri_length: 4,
            ..SecurityConfig::default()
        });
        assert!(validator.validate(&RawRequest::new("GET", "/abc")));
        assert!(!validator.validate(&RawRequest::new("GET", "/abcd")));
    }
}

//! Cached `Date` header value.
//!
//! The rendered value only changes once per second, so it is kept in a
//! process-wide cache and re-rendered when the wall-clock second moves on.
//! Readers take a shared lock; only the first request of a new second
//! takes the write lock.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use httpdate::HttpDate;
use parking_lot::RwLock;

/// Length of an IMF-fixdate such as `Sun, 06 Nov 1994 08:49:37 GMT`.
pub const DATE_VALUE_LENGTH: usize = 29;

struct CachedDate {
    secs: u64,
    value: String,
}

static CACHE: OnceLock<RwLock<CachedDate>> = OnceLock::new();

fn cache() -> &'static RwLock<CachedDate> {
    CACHE.get_or_init(|| {
        let now = SystemTime::now();
        RwLock::new(CachedDate {
            secs: unix_secs(now),
            value: HttpDate::from(now).to_string(),
        })
    })
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Append the current date value to `dst`.
pub fn extend(dst: &mut Vec<u8>) {
    let now = SystemTime::now();
    let secs = unix_secs(now);
    {
        let cached = cache().read();
        if cached.secs == secs {
            dst.extend_from_slice(cached.value.as_bytes());
            return;
        }
    }

    let mut cached = cache().write();
    if cached.secs != secs {
        cached.secs = secs;
        cached.value = HttpDate::from(now).to_string();
    }
    dst.extend_from_slice(cached.value.as_bytes());
}

/// The current date value as a string.
pub fn now() -> String {
    let mut buf = Vec::with_capacity(DATE_VALUE_LENGTH);
    extend(&mut buf);
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_imf_fixdate() {
        let value = now();
        assert_eq!(value.len(), DATE_VALUE_LENGTH);
        assert!(value.ends_with(" GMT"));
        assert!(httpdate::parse_http_date(&value).is_ok());
    }

    #[test]
    fn consecutive_reads_agree_within_a_second() {
        let a = now();
        let b = now();
        let parsed_a = httpdate::parse_http_date(&a).unwrap();
        let parsed_b = httpdate::parse_http_date(&b).unwrap();
        assert!(parsed_b >= parsed_a);
    }
}

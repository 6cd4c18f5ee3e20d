//! Metrics collection and exposition.
//!
//! # Metrics
//! - `http_requests_total` (counter): requests by status
//! - `http_errors_total` (counter): failures by kind
//! - `http_bytes_read_total` / `http_bytes_written_total` (counters)
//! - `http_active_connections` (gauge): registered connection count
//! - `http_sessions` (gauge): live session count
//!
//! Every recording goes both to the `metrics` facade (scraped through the
//! Prometheus exporter) and to in-process atomics so a snapshot can be
//! taken without an exporter installed.

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Must be called inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Process-wide request counters.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    enabled: bool,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    active_connections: AtomicI64,
    active_sessions: AtomicU64,
}

/// Point-in-time copy of [`ServerMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub active_connections: i64,
    pub active_sessions: u64,
}

impl ServerMetrics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_request(&self, status: u16) {
        if !self.enabled {
            return;
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("http_requests_total", "status" => status.to_string()).increment(1);
    }

    pub fn record_error(&self, kind: &'static str) {
        if !self.enabled {
            return;
        }
        self.total_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("http_errors_total", "kind" => kind).increment(1);
    }

    pub fn record_bytes_read(&self, bytes: usize) {
        if !self.enabled {
            return;
        }
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
        metrics::counter!("http_bytes_read_total").increment(bytes as u64);
    }

    pub fn record_bytes_written(&self, bytes: usize) {
        if !self.enabled {
            return;
        }
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
        metrics::counter!("http_bytes_written_total").increment(bytes as u64);
    }

    pub fn update_active_connections(&self, count: i64) {
        if !self.enabled {
            return;
        }
        self.active_connections.store(count, Ordering::Relaxed);
        metrics::gauge!("http_active_connections").set(count as f64);
    }

    pub fn record_sessions(&self, count: usize) {
        if !self.enabled {
            return;
        }
        self.active_sessions.store(count as u64, Ordering::Relaxed);
        metrics::gauge!("http_sessions").set(count as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_errors: self.total_errors.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_metrics_stay_zero() {
        let metrics = ServerMetrics::new(false);
        metrics.record_request(200);
        metrics.record_error("handler");
        metrics.record_bytes_written(512);
        assert_eq!(metrics.snapshot(), MetricsSnapshot {
            total_requests: 0,
            total_errors: 0,
            bytes_read: 0,
            bytes_written: 0,
            active_connections: 0,
            active_sessions: 0,
        });
    }

    #[test]
    fn enabled_metrics_accumulate() {
        let metrics = ServerMetrics::new(true);
        metrics.record_request(200);
        metrics.record_request(500);
        metrics.record_error("handler");
        metrics.record_bytes_read(10);
        metrics.record_bytes_read(5);
        metrics.update_active_connections(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.bytes_read, 15);
        assert_eq!(snap.active_connections, 3);
    }
}

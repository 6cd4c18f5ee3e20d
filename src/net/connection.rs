//! Connection identity and liveness records.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Relaxed ordering is enough; ids only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Liveness record kept by the [`ConnectionRegistry`](crate::net::ConnectionRegistry).
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: String,
    pub client_address: String,
    pub created_at: Instant,
    pub(crate) last_activity: Instant,
}

impl ConnectionRecord {
    pub(crate) fn new(id: String, client_address: String, now: Instant) -> Self {
        Self {
            id,
            client_address,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Time since the last request, measured from `now`.
    pub fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[test]
    fn idle_time_never_negative() {
        let now = Instant::now();
        let record = ConnectionRecord::new("c".into(), "127.0.0.1:1".into(), now);
        assert_eq!(record.idle_for(now), std::time::Duration::ZERO);
    }
}

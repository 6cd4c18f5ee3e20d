//! In-memory session store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::http::Cookie;
use crate::observability::ServerMetrics;

/// Server-side attribute bag.
///
/// Reading an attribute refreshes the last-access time; writes and removals
/// do not.
#[derive(Debug)]
pub struct Session {
    id: String,
    attributes: Mutex<HashMap<String, Value>>,
    last_accessed: Mutex<Instant>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Mutex::new(HashMap::new()),
            last_accessed: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get_attribute(&self, name: &str) -> Option<Value> {
        *self.last_accessed.lock() = Instant::now();
        self.attributes.lock().get(name).cloned()
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: Value) {
        self.attributes.lock().insert(name.into(), value);
    }

    pub fn remove_attribute(&self, name: &str) -> Option<Value> {
        self.attributes.lock().remove(name)
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.lock().keys().cloned().collect()
    }

    /// Drop every attribute. The id stays resolvable in the store.
    pub fn invalidate(&self) {
        self.attributes.lock().clear();
    }

    pub fn last_accessed(&self) -> Instant {
        *self.last_accessed.lock()
    }

    fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_accessed()) > timeout
    }
}

#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<Session>>,
    timeout_ms: AtomicU64,
    metrics: Arc<ServerMetrics>,
}

impl SessionStore {
    pub fn new(timeout: Duration, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout_ms: AtomicU64::new(millis(timeout)),
            metrics,
        }
    }

    /// Look up a session, creating an empty one if the id is unknown.
    pub fn get(&self, id: &str) -> Arc<Session> {
        let session = match self.sessions.entry(id.to_string()) {
            Entry::Occupied(existing) => return Arc::clone(existing.get()),
            Entry::Vacant(slot) => Arc::clone(slot.insert(Arc::new(Session::new(id))).value()),
        };
        self.publish_count();
        session
    }

    /// Create a session under a fresh random id.
    pub fn create(&self) -> Arc<Session> {
        self.get(&uuid::Uuid::new_v4().to_string())
    }

    pub fn put(&self, id: impl Into<String>, session: Arc<Session>) {
        self.sessions.insert(id.into(), session);
        self.publish_count();
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(id).map(|(_, s)| s);
        self.publish_count();
        removed
    }

    fn publish_count(&self) {
        self.metrics.record_sessions(self.sessions.len());
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Applies to the next sweep.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(millis(timeout), Ordering::Relaxed);
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Remove sessions idle longer than the timeout as of `now`.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let timeout = self.timeout();
        let candidates: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_expired(now, timeout))
            .map(|s| s.key().clone())
            .collect();

        let removed = candidates
            .iter()
            .filter(|id| {
                self.sessions
                    .remove_if(id.as_str(), |_, s| s.is_expired(now, timeout))
                    .is_some()
            })
            .count();

        self.publish_count();
        removed
    }

    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = interval.as_secs(), "Session sweeper starting");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_expired();
                    if removed > 0 {
                        tracing::info!(removed, remaining = self.len(), "Expired idle sessions");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// Timeouts past `u64::MAX` milliseconds saturate.
fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// `Set-Cookie` value binding a client to `session_id`.
pub fn session_cookie(cookie_name: &str, session_id: &str) -> Cookie {
    Cookie::builder(cookie_name, session_id).http_only(true).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(1800), Arc::new(ServerMetrics::new(true)))
    }

    #[test]
    fn get_creates_and_returns_same_record() {
        let store = store();
        let first = store.get("abc");
        first.set_attribute("user", json!("alice"));

        let second = store.get("abc");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get_attribute("user"), Some(json!("alice")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn invalidate_keeps_id_resolvable() {
        let store = store();
        let session = store.get("s");
        session.set_attribute("a", json!(1));
        session.invalidate();

        assert!(store.contains("s"));
        assert!(store.get("s").attribute_names().is_empty());
        assert!(store.remove("s").is_some());
        assert!(!store.contains("s"));
    }

    #[test]
    fn create_uses_fresh_ids() {
        let store = store();
        assert_ne!(store.create().id(), store.create().id());
    }

    #[tokio::test(start_paused = true)]
    async fn only_attribute_reads_refresh_access_time() {
        let store = store();
        let session = store.get("s");
        let created = session.last_accessed();

        time::advance(Duration::from_secs(5)).await;
        session.set_attribute("k", json!(true));
        session.remove_attribute("k");
        assert_eq!(session.last_accessed(), created);

        session.get_attribute("k");
        assert!(session.last_accessed() > created);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_sessions() {
        let store = store();
        store.get("old");
        time::advance(Duration::from_secs(1000)).await;
        let fresh = store.get("fresh");
        time::advance(Duration::from_secs(801)).await;
        fresh.get_attribute("touch");

        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.contains("old"));
        assert!(store.contains("fresh"));
    }

    #[test]
    fn oversized_timeout_saturates() {
        let store = store();
        store.set_timeout(Duration::MAX);
        assert_eq!(store.timeout(), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn session_count_reaches_metrics() {
        let metrics = Arc::new(ServerMetrics::new(true));
        let store = SessionStore::new(Duration::from_secs(60), Arc::clone(&metrics));
        store.get("a");
        store.get("a");
        store.create();
        assert_eq!(metrics.snapshot().active_sessions, 2);

        store.remove("a");
        assert_eq!(metrics.snapshot().active_sessions, 1);
    }

    #[test]
    fn session_cookie_is_http_only() {
        let cookie = session_cookie("SESSIONID", "abc");
        assert_eq!(cookie.to_set_cookie(), "SESSIONID=abc; Path=/; HttpOnly");
    }
}

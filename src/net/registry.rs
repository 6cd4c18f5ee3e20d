//! Connection registry.
//!
//! # Responsibilities
//! - Admit connections up to `max_connections`
//! - Track per-connection last activity
//! - Evict connections idle past the keep-alive timeout
//!
//! The active counter changes only in `register`, `unregister` and sweep
//! eviction, and a decrement only follows a successful map removal, so a
//! double unregister or an unregister racing the sweep cannot drive it
//! below the number of tracked entries.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::error::{PipelineError, Result};
use crate::net::connection::ConnectionRecord;
use crate::observability::ServerMetrics;

/// Registry counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStats {
    pub active: usize,
    pub total_ever_registered: u64,
    pub current_tracked: usize,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ConnectionRecord>,
    active: AtomicUsize,
    total_registered: AtomicU64,
    max_connections: usize,
    keep_alive: Duration,
    metrics: Arc<ServerMetrics>,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize, keep_alive: Duration, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            connections: DashMap::new(),
            active: AtomicUsize::new(0),
            total_registered: AtomicU64::new(0),
            max_connections,
            keep_alive,
            metrics,
        }
    }

    /// Admit a connection. Re-registering a known id only refreshes it.
    pub fn register(&self, id: &str, client_address: &str) -> Result<()> {
        let now = Instant::now();
        match self.connections.entry(id.to_string()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().last_activity = now;
                Ok(())
            }
            Entry::Vacant(slot) => {
                self.reserve()?;
                slot.insert(ConnectionRecord::new(
                    id.to_string(),
                    client_address.to_string(),
                    now,
                ));
                self.total_registered.fetch_add(1, Ordering::Relaxed);
                self.publish_active();
                tracing::debug!(connection_id = id, client = client_address, "Connection registered");
                Ok(())
            }
        }
    }

    fn reserve(&self) -> Result<()> {
        let mut prev = self.active.load(Ordering::Relaxed);
        loop {
            if prev >= self.max_connections {
                return Err(PipelineError::CapacityExceeded {
                    max: self.max_connections,
                });
            }
            match self.active.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Refresh last activity. Unknown ids are ignored.
    pub fn touch(&self, id: &str) {
        if let Some(mut record) = self.connections.get_mut(id) {
            record.last_activity = Instant::now();
        }
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn unregister(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            self.release();
            tracing::debug!(connection_id = id, "Connection unregistered");
        }
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        self.publish_active();
    }

    fn publish_active(&self) {
        self.metrics
            .update_active_connections(self.active.load(Ordering::Relaxed) as i64);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<ConnectionRecord> {
        self.connections.get(id).map(|r| r.value().clone())
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            active: self.active.load(Ordering::Relaxed),
            total_ever_registered: self.total_registered.load(Ordering::Relaxed),
            current_tracked: self.connections.len(),
        }
    }

    /// Evict every connection idle longer than the keep-alive timeout.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    /// Sweep as of `now`. Each eviction re-checks idleness under the entry
    /// lock, so a connection touched mid-sweep survives.
    pub fn sweep_idle_at(&self, now: Instant) -> usize {
        let candidates: Vec<String> = self
            .connections
            .iter()
            .filter(|r| r.idle_for(now) > self.keep_alive)
            .map(|r| r.key().clone())
            .collect();

        let mut evicted = 0;
        for id in candidates {
            let removed = self
                .connections
                .remove_if(&id, |_, r| r.idle_for(now) > self.keep_alive);
            if removed.is_some() {
                self.release();
                evicted += 1;
            }
        }
        evicted
    }

    /// Periodic eviction until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?interval, "Connection sweeper starting");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = self.sweep_idle();
                    if evicted > 0 {
                        tracing::info!(evicted, active = self.stats().active, "Evicted idle connections");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Connection sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

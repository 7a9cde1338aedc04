//! Client connection accounting.
//!
//! # Responsibilities
//! - Give each accepted socket an ID for log correlation
//! - Count open and lifetime connections for the admin API and metrics
//! - Let shutdown wait until every connection has finished

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::observability::metrics;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an accepted client socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicU64,
    total: AtomicU64,
    drained: Notify,
}

/// Shared view of open client connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counters: Arc<Counters>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection; the returned guard unregisters it on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.counters.active.fetch_add(1, Ordering::SeqCst);
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        metrics::record_connection_opened();

        ConnectionGuard {
            counters: Arc::clone(&self.counters),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.counters.active.load(Ordering::SeqCst)
    }

    pub fn total_count(&self) -> u64 {
        self.counters.total.load(Ordering::Relaxed)
    }

    /// Wait for every tracked connection to close, up to `deadline`.
    ///
    /// Returns `false` if connections were still open when time ran out.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let drained = async {
            loop {
                let notified = self.counters.drained.notified();
                if self.active_count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Keeps a connection counted while alive.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let remaining = self.counters.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_connection_closed();
        if remaining == 0 {
            self.counters.drained.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, remaining, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_counts() {
        let tracker = ConnectionTracker::new();
        let a = tracker.track();
        let b = tracker.track();
        assert_ne!(a.id(), b.id());
        assert_eq!(tracker.active_count(), 2);

        drop(a);
        assert_eq!(tracker.active_count(), 1);
        drop(b);
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.total_count(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_drain() {
        let tracker = ConnectionTracker::new();
        assert!(tracker.wait_for_drain(Duration::from_millis(10)).await);

        let guard = tracker.track();
        assert!(!tracker.wait_for_drain(Duration::from_millis(20)).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });
        assert!(tracker.wait_for_drain(Duration::from_secs(2)).await);
    }
}

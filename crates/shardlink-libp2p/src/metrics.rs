//! Connection accounting: interval counters and the connections watcher.

use crate::config::ConnectionWatcherKind;
use libp2p::PeerId;
use parking_lot::Mutex;
use shardlink_core::P2pError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Time a printed connection stays deduplicated before it is logged again.
pub(crate) const TTL_CONNECTIONS_WATCHER: Duration = Duration::from_secs(2 * 60 * 60);

/// Monotonic connect/disconnect counters, resettable by a swap-to-zero read.
#[derive(Debug, Default)]
pub struct ConnectionsMetric {
    connections: AtomicU32,
    disconnections: AtomicU32,
}

impl ConnectionsMetric {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_connections(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_disconnections(&self) {
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the connect counter.
    pub fn reset_num_connections(&self) -> u32 {
        self.connections.swap(0, Ordering::Relaxed)
    }

    /// Read and reset the disconnect counter.
    pub fn reset_num_disconnections(&self) -> u32 {
        self.disconnections.swap(0, Ordering::Relaxed)
    }
}

/// Observes newly established connections.
pub trait ConnectionsWatcher: Send + Sync {
    fn new_known_connection(&self, peer: &PeerId, connection: &str);
    fn close(&self) {}
}

/// Watcher that logs each newly seen peer, deduplicated within a TTL.
pub struct PrintConnectionsWatcher {
    ttl: Duration,
    seen: Mutex<HashMap<PeerId, Instant>>,
}

impl PrintConnectionsWatcher {
    pub fn new(ttl: Duration) -> Result<Self, P2pError> {
        if ttl.is_zero() {
            return Err(P2pError::InvalidDurationProvided("connections watcher ttl"));
        }
        Ok(Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        })
    }
}

impl ConnectionsWatcher for PrintConnectionsWatcher {
    fn new_known_connection(&self, peer: &PeerId, connection: &str) {
        let mut seen = self.seen.lock();
        seen.retain(|_, stamped| stamped.elapsed() < self.ttl);

        if seen.insert(*peer, Instant::now()).is_none() {
            info!(peer = %peer, connection, "new peer connection");
        }
    }
}

/// No-op watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledConnectionsWatcher;

impl ConnectionsWatcher for DisabledConnectionsWatcher {
    fn new_known_connection(&self, _peer: &PeerId, _connection: &str) {}
}

/// Build the watcher selected by configuration.
pub fn new_connections_watcher(
    kind_value: &str,
    ttl: Duration,
) -> Result<Arc<dyn ConnectionsWatcher>, P2pError> {
    match ConnectionWatcherKind::parse(kind_value)? {
        ConnectionWatcherKind::Print => Ok(Arc::new(PrintConnectionsWatcher::new(ttl)?)),
        ConnectionWatcherKind::Disabled => Ok(Arc::new(DisabledConnectionsWatcher)),
    }
}

//! Connection monitoring: minimum-connectivity enforcement and the
//! denial-policy wrapper.
//!
//! The inner monitor keeps the node connected (reconnecting below a
//! threshold); the wrapper decorates it with the peer-denial policy, closing
//! connections to denied peers on connect and during the periodic sweep.

use crate::metrics::ConnectionsWatcher;
use libp2p::PeerId;
use parking_lot::RwLock;
use shardlink_core::{PeerDenialEvaluator, Reconnecter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Host operations the monitor needs: the current peer list and the ability
/// to drop a peer.
pub trait ConnectionsHost: Send + Sync {
    fn connected_peers(&self) -> Vec<PeerId>;
    fn close_peer(&self, peer: &PeerId);
}

/// Reacts to connection lifecycle events forwarded by the host.
pub trait ConnectionMonitor: Send + Sync {
    fn on_connected(&self, peer: &PeerId, connection: &str, num_connected: usize);
    fn on_disconnected(&self, peer: &PeerId, num_connected: usize);
    fn is_connected_to_the_network(&self, num_connected: usize) -> bool;
    fn set_threshold_min_connected_peers(&self, threshold: usize);
    fn threshold_min_connected_peers(&self) -> usize;
}

/// Monitor that triggers reconnection whenever connectivity drops below the
/// configured threshold.
pub struct SimpleConnectionMonitor {
    reconnecter: Arc<dyn Reconnecter>,
    threshold: AtomicUsize,
    watcher: Arc<dyn ConnectionsWatcher>,
}

impl SimpleConnectionMonitor {
    pub fn new(
        reconnecter: Arc<dyn Reconnecter>,
        threshold_min_connected_peers: usize,
        watcher: Arc<dyn ConnectionsWatcher>,
    ) -> Self {
        Self {
            reconnecter,
            threshold: AtomicUsize::new(threshold_min_connected_peers),
            watcher,
        }
    }
}

impl ConnectionMonitor for SimpleConnectionMonitor {
    fn on_connected(&self, peer: &PeerId, connection: &str, _num_connected: usize) {
        self.watcher.new_known_connection(peer, connection);
    }

    fn on_disconnected(&self, _peer: &PeerId, num_connected: usize) {
        if num_connected < self.threshold.load(Ordering::Acquire) {
            self.reconnecter.reconnect_to_network();
        }
    }

    fn is_connected_to_the_network(&self, num_connected: usize) -> bool {
        num_connected >= self.threshold.load(Ordering::Acquire)
    }

    fn set_threshold_min_connected_peers(&self, threshold: usize) {
        self.threshold.store(threshold, Ordering::Release);
    }

    fn threshold_min_connected_peers(&self) -> usize {
        self.threshold.load(Ordering::Acquire)
    }
}

/// Decorates a [`ConnectionMonitor`] with the peer-denial policy.
///
/// Starts with a deny-nothing evaluator; the application swaps in a real one
/// through [`set_peer_denial_evaluator`](Self::set_peer_denial_evaluator).
pub struct ConnectionMonitorWrapper {
    inner: Arc<dyn ConnectionMonitor>,
    host: Arc<dyn ConnectionsHost>,
    denial_evaluator: RwLock<Arc<dyn PeerDenialEvaluator>>,
}

impl ConnectionMonitorWrapper {
    pub fn new(
        inner: Arc<dyn ConnectionMonitor>,
        host: Arc<dyn ConnectionsHost>,
        denial_evaluator: Arc<dyn PeerDenialEvaluator>,
    ) -> Self {
        Self {
            inner,
            host,
            denial_evaluator: RwLock::new(denial_evaluator),
        }
    }

    /// Handle a newly established connection.
    ///
    /// Returns `false` when the peer is denied; the connection is closed and
    /// the inner monitor is not notified.
    pub fn handle_connected(&self, peer: &PeerId, connection: &str, num_connected: usize) -> bool {
        let evaluator = self.denial_evaluator.read().clone();
        if evaluator.is_denied(peer) {
            trace!(peer = %peer, "dropping connection to denied peer");
            self.host.close_peer(peer);
            return false;
        }

        self.inner.on_connected(peer, connection, num_connected);
        true
    }

    pub fn handle_disconnected(&self, peer: &PeerId, num_connected: usize) {
        self.inner.on_disconnected(peer, num_connected);
    }

    /// Sweep current connections, closing every denied peer.
    pub fn check_connections_blocking(&self) {
        let evaluator = self.denial_evaluator.read().clone();
        for peer in self.host.connected_peers() {
            if evaluator.is_denied(&peer) {
                trace!(peer = %peer, "dropping connection to denied peer");
                self.host.close_peer(&peer);
            }
        }
    }

    pub fn set_peer_denial_evaluator(&self, evaluator: Arc<dyn PeerDenialEvaluator>) {
        *self.denial_evaluator.write() = evaluator;
    }

    pub fn peer_denial_evaluator(&self) -> Arc<dyn PeerDenialEvaluator> {
        self.denial_evaluator.read().clone()
    }

    pub fn inner(&self) -> &Arc<dyn ConnectionMonitor> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::DisabledConnectionsWatcher;
    use parking_lot::Mutex;
    use shardlink_core::P2pError;
    use std::time::Duration;

    #[derive(Default)]
    struct ReconnectSpy {
        calls: AtomicUsize,
    }

    impl Reconnecter for ReconnectSpy {
        fn reconnect_to_network(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct HostStub {
        peers: Mutex<Vec<PeerId>>,
        closed: Mutex<Vec<PeerId>>,
    }

    impl ConnectionsHost for HostStub {
        fn connected_peers(&self) -> Vec<PeerId> {
            self.peers.lock().clone()
        }

        fn close_peer(&self, peer: &PeerId) {
            self.closed.lock().push(*peer);
        }
    }

    struct DenyListed(Vec<PeerId>);

    impl PeerDenialEvaluator for DenyListed {
        fn is_denied(&self, peer: &PeerId) -> bool {
            self.0.contains(peer)
        }

        fn upsert_peer(&self, _peer: &PeerId, _duration: Duration) -> Result<(), P2pError> {
            Ok(())
        }
    }

    fn simple_monitor(reconnecter: Arc<ReconnectSpy>, threshold: usize) -> SimpleConnectionMonitor {
        SimpleConnectionMonitor::new(reconnecter, threshold, Arc::new(DisabledConnectionsWatcher))
    }

    #[test]
    fn test_reconnect_triggered_below_threshold() {
        let reconnecter = Arc::new(ReconnectSpy::default());
        let monitor = simple_monitor(reconnecter.clone(), 3);

        monitor.on_disconnected(&PeerId::random(), 2);
        assert_eq!(reconnecter.calls.load(Ordering::SeqCst), 1);

        monitor.on_disconnected(&PeerId::random(), 3);
        assert_eq!(reconnecter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_network_connectivity_tracks_threshold() {
        let monitor = simple_monitor(Arc::new(ReconnectSpy::default()), 2);

        assert!(!monitor.is_connected_to_the_network(1));
        assert!(monitor.is_connected_to_the_network(2));

        monitor.set_threshold_min_connected_peers(5);
        assert_eq!(monitor.threshold_min_connected_peers(), 5);
        assert!(!monitor.is_connected_to_the_network(2));
    }

    #[test]
    fn test_denied_peer_closed_on_connect() {
        let host = Arc::new(HostStub::default());
        let denied = PeerId::random();
        let wrapper = ConnectionMonitorWrapper::new(
            Arc::new(simple_monitor(Arc::new(ReconnectSpy::default()), 0)),
            host.clone(),
            Arc::new(DenyListed(vec![denied])),
        );

        assert!(!wrapper.handle_connected(&denied, "/ip4/127.0.0.1/tcp/1", 1));
        assert_eq!(host.closed.lock().as_slice(), &[denied]);

        let allowed = PeerId::random();
        assert!(wrapper.handle_connected(&allowed, "/ip4/127.0.0.1/tcp/2", 2));
        assert_eq!(host.closed.lock().len(), 1);
    }

    #[test]
    fn test_sweep_closes_only_denied_peers() {
        let host = Arc::new(HostStub::default());
        let denied = PeerId::random();
        let allowed = PeerId::random();
        *host.peers.lock() = vec![denied, allowed];

        let wrapper = ConnectionMonitorWrapper::new(
            Arc::new(simple_monitor(Arc::new(ReconnectSpy::default()), 0)),
            host.clone(),
            Arc::new(DenyListed(vec![denied])),
        );

        wrapper.check_connections_blocking();
        assert_eq!(host.closed.lock().as_slice(), &[denied]);
    }

    #[test]
    fn test_evaluator_swap_takes_effect() {
        let host = Arc::new(HostStub::default());
        let peer = PeerId::random();
        let wrapper = ConnectionMonitorWrapper::new(
            Arc::new(simple_monitor(Arc::new(ReconnectSpy::default()), 0)),
            host.clone(),
            Arc::new(DenyListed(Vec::new())),
        );

        assert!(wrapper.handle_connected(&peer, "conn", 1));

        wrapper.set_peer_denial_evaluator(Arc::new(DenyListed(vec![peer])));
        assert!(!wrapper.handle_connected(&peer, "conn", 1));
    }
}

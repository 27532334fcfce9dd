//! Narrow interfaces for the messenger's pluggable collaborators.
//!
//! Each trait covers exactly the operations the core touches. Required
//! collaborators are non-optional constructor parameters; defaults for the
//! swappable ones live in the implementation crate.

use crate::error::P2pError;
use crate::message::P2pMessage;
use crate::peer_info::PeerInfo;
use libp2p_identity::PeerId;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Boxed error returned by application-level message processors.
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════
// Time
// ═══════════════════════════════════════════════════════════════════════

/// Monotonically-correct wall clock used for message freshness checks.
pub trait SyncTimer: Send + Sync {
    fn current_time(&self) -> SystemTime;

    /// Current time as seconds since the Unix epoch.
    fn current_unix(&self) -> i64 {
        self.current_time()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

/// [`SyncTimer`] backed by the local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSyncTimer;

impl SyncTimer for LocalSyncTimer {
    fn current_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Peer policy
// ═══════════════════════════════════════════════════════════════════════

/// Decides whether a peer may stay connected and for how long a temporary
/// block lasts.
pub trait PeerDenialEvaluator: Send + Sync {
    fn is_denied(&self, peer: &PeerId) -> bool;
    fn upsert_peer(&self, peer: &PeerId, duration: Duration) -> Result<(), P2pError>;
}

/// Resolves the shard placement and role of a peer.
pub trait PeerShardResolver: Send + Sync {
    fn peer_info(&self, peer: &PeerId) -> PeerInfo;
}

/// Lists peers that should be prioritized in connection accounting.
pub trait PreferredPeersHolder: Send + Sync {
    fn contains(&self, peer: &PeerId) -> bool;
}

/// Receives credit events for peers that deliver valid traffic.
pub trait PeersRatingHandler: Send + Sync {
    fn add_peer(&self, peer: &PeerId);
    fn increase_rating(&self, peer: &PeerId);
}

/// Shard-topology oracle owned by the application.
pub trait Sharder: Send + Sync {
    fn is_seeder(&self, peer: &PeerId) -> bool;
    fn set_peer_shard_resolver(&self, resolver: Arc<dyn PeerShardResolver>);
}

// ═══════════════════════════════════════════════════════════════════════
// Discovery
// ═══════════════════════════════════════════════════════════════════════

/// Triggers reconnection when connectivity drops below the configured
/// threshold.
pub trait Reconnecter: Send + Sync {
    fn reconnect_to_network(&self);
}

/// Starts the peer discovery mechanism. Every discoverer must also be able
/// to reconnect, hence the supertrait bound.
pub trait PeerDiscoverer: Reconnecter {
    fn bootstrap(&self) -> Result<(), P2pError>;
}

// ═══════════════════════════════════════════════════════════════════════
// Observability
// ═══════════════════════════════════════════════════════════════════════

/// Sink for per-message debug accounting.
pub trait Debugger: Send + Sync {
    fn add_incoming_message(&self, topic: &str, size: u64, rejected: bool);
    fn add_outgoing_message(&self, topic: &str, size: u64, rejected: bool);
    fn close(&self) {}
}

/// Notified whenever a new peer shows up on a topic.
pub trait PeerTopicNotifier: Send + Sync {
    fn new_peer_found(&self, peer: &PeerId, topic: &str);
}

// ═══════════════════════════════════════════════════════════════════════
// Messages
// ═══════════════════════════════════════════════════════════════════════

/// Application-level validator invoked for every message on a registered
/// topic. Processors must be lightweight; they run on the delivery path.
pub trait MessageProcessor: Send + Sync {
    fn process_received_message(
        &self,
        message: &P2pMessage,
        from_connected_peer: &PeerId,
    ) -> Result<(), ProcessError>;
}

/// Verifies a payload signature attributed to a peer.
pub trait MessageVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], peer: &PeerId, signature: &[u8]) -> Result<(), P2pError>;
}

//! Default collaborators installed at construction until the application
//! swaps in real ones.

use libp2p::PeerId;
use shardlink_core::{
    Debugger, P2pError, PeerDenialEvaluator, PeerInfo, PeerShardResolver, PeersRatingHandler,
    PreferredPeersHolder, Sharder,
};
use std::sync::Arc;
use std::time::Duration;

/// Denies nothing and accepts every upsert.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPeerDenialEvaluator;

impl PeerDenialEvaluator for DisabledPeerDenialEvaluator {
    fn is_denied(&self, _peer: &PeerId) -> bool {
        false
    }

    fn upsert_peer(&self, _peer: &PeerId, _duration: Duration) -> Result<(), P2pError> {
        Ok(())
    }
}

/// Swallows every debug record.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledDebugger;

impl Debugger for DisabledDebugger {
    fn add_incoming_message(&self, _topic: &str, _size: u64, _rejected: bool) {}
    fn add_outgoing_message(&self, _topic: &str, _size: u64, _rejected: bool) {}
}

/// Resolver that knows nothing: every peer is an unknown regular peer on
/// shard 0.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownPeerShardResolver;

impl PeerShardResolver for UnknownPeerShardResolver {
    fn peer_info(&self, _peer: &PeerId) -> PeerInfo {
        PeerInfo::default()
    }
}

/// Sharder with no topology: nothing is a seeder.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSharder;

impl Sharder for DisabledSharder {
    fn is_seeder(&self, _peer: &PeerId) -> bool {
        false
    }

    fn set_peer_shard_resolver(&self, _resolver: Arc<dyn PeerShardResolver>) {}
}

/// Holder that prefers no one.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPreferredPeersHolder;

impl PreferredPeersHolder for DisabledPreferredPeersHolder {
    fn contains(&self, _peer: &PeerId) -> bool {
        false
    }
}

/// Rating handler that keeps no score.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPeersRatingHandler;

impl PeersRatingHandler for DisabledPeersRatingHandler {
    fn add_peer(&self, _peer: &PeerId) {}
    fn increase_rating(&self, _peer: &PeerId) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardlink_core::{PeerSubType, PeerType};

    #[test]
    fn test_disabled_denial_evaluator() {
        let evaluator = DisabledPeerDenialEvaluator;
        let peer = PeerId::random();

        assert!(!evaluator.is_denied(&peer));
        assert!(evaluator.upsert_peer(&peer, Duration::from_secs(1)).is_ok());
        assert!(!evaluator.is_denied(&peer));
    }

    #[test]
    fn test_unknown_resolver_classification() {
        let info = UnknownPeerShardResolver.peer_info(&PeerId::random());
        assert_eq!(info.peer_type, PeerType::Unknown);
        assert_eq!(info.peer_sub_type, PeerSubType::Regular);
        assert_eq!(info.shard_id, 0);
    }
}

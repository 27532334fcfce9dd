//! Peer classification as seen by the shard resolver.

use std::collections::BTreeMap;

/// Role a remote peer plays in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeerType {
    /// The resolver has no information about this peer.
    #[default]
    Unknown,
    /// A consensus validator.
    Validator,
    /// A non-validating observer.
    Observer,
}

/// Secondary classification, orthogonal to [`PeerType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PeerSubType {
    #[default]
    Regular,
    /// An observer keeping the full chain history.
    FullHistoryObserver,
}

/// Resolver verdict for a single peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerInfo {
    pub peer_type: PeerType,
    pub peer_sub_type: PeerSubType,
    pub shard_id: u32,
}

/// Snapshot of the currently connected peers, bucketed by classification.
///
/// Connection strings are `multiaddr/p2p/peer-id` renderings. Maps are keyed
/// by shard id; `BTreeMap` keeps histogram logging in shard order.
#[derive(Debug, Clone, Default)]
pub struct ConnectedPeersInfo {
    pub self_shard_id: u32,

    pub unknown_peers: Vec<String>,
    pub seeders: Vec<String>,
    pub intra_shard_validators: BTreeMap<u32, Vec<String>>,
    pub intra_shard_observers: BTreeMap<u32, Vec<String>>,
    pub cross_shard_validators: BTreeMap<u32, Vec<String>>,
    pub cross_shard_observers: BTreeMap<u32, Vec<String>>,
    pub full_history_observers: BTreeMap<u32, Vec<String>>,

    pub num_intra_shard_validators: usize,
    pub num_intra_shard_observers: usize,
    pub num_cross_shard_validators: usize,
    pub num_cross_shard_observers: usize,
    pub num_full_history_observers: usize,

    pub num_validators_on_shard: BTreeMap<u32, usize>,
    pub num_observers_on_shard: BTreeMap<u32, usize>,
    pub num_preferred_peers_on_shard: BTreeMap<u32, usize>,
}

//! Connected-peers classification.

use super::core::NetworkMessenger;
use shardlink_core::{ConnectedPeersInfo, PeerSubType, PeerType};

impl NetworkMessenger {
    /// Snapshot of the connected peers, classified through the shard
    /// resolver and the sharder.
    ///
    /// Every peer lands in exactly one bucket: unknowns split into seeders
    /// and true unknowns, validators and observers split into intra- and
    /// cross-shard, full-history observers take precedence over the shard
    /// split.
    pub fn get_connected_peers_info(&self) -> ConnectedPeersInfo {
        let resolver = self.peer_shard_resolver.read().clone();
        let mut info = ConnectedPeersInfo {
            self_shard_id: resolver.peer_info(&self.id()).shard_id,
            ..Default::default()
        };

        for peer in self.handle.connected_peer_list() {
            let connection = self.handle.connection_string(&peer);
            let peer_info = resolver.peer_info(&peer);

            match peer_info.peer_type {
                PeerType::Unknown => {
                    if self.sharder.is_seeder(&peer) {
                        info.seeders.push(connection.clone());
                    } else {
                        info.unknown_peers.push(connection.clone());
                    }
                }
                PeerType::Validator => {
                    *info
                        .num_validators_on_shard
                        .entry(peer_info.shard_id)
                        .or_default() += 1;
                    if peer_info.shard_id == info.self_shard_id {
                        info.intra_shard_validators
                            .entry(peer_info.shard_id)
                            .or_default()
                            .push(connection.clone());
                        info.num_intra_shard_validators += 1;
                    } else {
                        info.cross_shard_validators
                            .entry(peer_info.shard_id)
                            .or_default()
                            .push(connection.clone());
                        info.num_cross_shard_validators += 1;
                    }
                }
                PeerType::Observer => {
                    *info
                        .num_observers_on_shard
                        .entry(peer_info.shard_id)
                        .or_default() += 1;

                    if peer_info.peer_sub_type == PeerSubType::FullHistoryObserver {
                        info.full_history_observers
                            .entry(peer_info.shard_id)
                            .or_default()
                            .push(connection.clone());
                        info.num_full_history_observers += 1;
                    } else if peer_info.shard_id == info.self_shard_id {
                        info.intra_shard_observers
                            .entry(peer_info.shard_id)
                            .or_default()
                            .push(connection.clone());
                        info.num_intra_shard_observers += 1;
                    } else {
                        info.cross_shard_observers
                            .entry(peer_info.shard_id)
                            .or_default()
                            .push(connection.clone());
                        info.num_cross_shard_observers += 1;
                    }
                }
            }

            if self.preferred_peers_holder.contains(&peer) {
                *info
                    .num_preferred_peers_on_shard
                    .entry(peer_info.shard_id)
                    .or_default() += 1;
            }
        }

        info
    }
}

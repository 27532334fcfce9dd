//! Background statistics and logger-maintenance loops.

use super::core::NetworkMessenger;
use super::{TIME_BETWEEN_EXTERNAL_LOGGERS_CHECK, TIME_BETWEEN_PEER_PRINTS};
use crate::logging;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Render a per-shard histogram in shard order, e.g. `shard 0: 3, shard 1: 1`.
fn render_histogram(histogram: &BTreeMap<u32, usize>) -> String {
    histogram
        .iter()
        .map(|(shard, count)| format!("shard {shard}: {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl NetworkMessenger {
    pub(crate) fn spawn_stats_loop(self: &Arc<Self>) {
        let messenger = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = messenger.cancel.cancelled() => {
                        debug!("network statistics loop stopping");
                        return;
                    }
                    _ = tokio::time::sleep(TIME_BETWEEN_PEER_PRINTS) => {}
                }

                let connections = messenger.connections_metric.reset_num_connections();
                let disconnections = messenger.connections_metric.reset_num_disconnections();
                let interval_secs = TIME_BETWEEN_PEER_PRINTS.as_secs() as u32;

                let peers_info = messenger.get_connected_peers_info();
                debug!(
                    known_peers = messenger.peers().len(),
                    connected_peers = messenger.connected_peers().len(),
                    intra_shard_validators = peers_info.num_intra_shard_validators,
                    intra_shard_observers = peers_info.num_intra_shard_observers,
                    cross_shard_validators = peers_info.num_cross_shard_validators,
                    cross_shard_observers = peers_info.num_cross_shard_observers,
                    full_history_observers = peers_info.num_full_history_observers,
                    unknown = peers_info.unknown_peers.len(),
                    seeders = peers_info.seeders.len(),
                    current_shard = peers_info.self_shard_id,
                    validators_histogram = %render_histogram(&peers_info.num_validators_on_shard),
                    observers_histogram = %render_histogram(&peers_info.num_observers_on_shard),
                    preferred_histogram = %render_histogram(&peers_info.num_preferred_peers_on_shard),
                    "network connection status"
                );

                debug!(
                    connections_per_sec = connections / interval_secs,
                    disconnections_per_sec = disconnections / interval_secs,
                    connections,
                    disconnections,
                    interval_secs,
                    "network connection metrics"
                );
            }
        });
    }

    pub(crate) fn spawn_external_loggers_loop(cancel: CancellationToken) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("external loggers check loop stopping");
                        return;
                    }
                    _ = tokio::time::sleep(TIME_BETWEEN_EXTERNAL_LOGGERS_CHECK) => {}
                }

                logging::refresh_external_levels();
            }
        });
    }
}

//! Cloneable handle onto the swarm task.
//!
//! Hot reads (connected peers, addresses) are served from shared maps the
//! event loop maintains; everything that must touch the swarm goes through
//! the command channel.

use super::command::SwarmCommand;
use crate::connection_monitor::ConnectionsHost;
use crate::discovery::Dialer;
use dashmap::DashMap;
use libp2p::{Multiaddr, PeerId};
use parking_lot::RwLock;
use shardlink_core::P2pError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Connection string used when a connected peer has no recorded address.
const INVALID_CONNECTION_STRING: &str = "[invalid connection string]";

#[derive(Clone)]
pub struct SwarmHandle {
    local_peer_id: PeerId,
    command_tx: mpsc::UnboundedSender<SwarmCommand>,
    connected: Arc<DashMap<PeerId, Vec<Multiaddr>>>,
    known_addresses: Arc<DashMap<PeerId, Vec<Multiaddr>>>,
    listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
}

impl SwarmHandle {
    pub(crate) fn new(
        local_peer_id: PeerId,
        command_tx: mpsc::UnboundedSender<SwarmCommand>,
        connected: Arc<DashMap<PeerId, Vec<Multiaddr>>>,
        known_addresses: Arc<DashMap<PeerId, Vec<Multiaddr>>>,
        listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    ) -> Self {
        Self {
            local_peer_id,
            command_tx,
            connected,
            known_addresses,
            listen_addrs,
        }
    }

    fn send_command(&self, command: SwarmCommand) -> Result<(), P2pError> {
        self.command_tx
            .send(command)
            .map_err(|_| P2pError::NetworkShutdown)
    }

    // ── Swarm commands ───────────────────────────────────────────────

    pub async fn dial(&self, address: Multiaddr) -> Result<(), P2pError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send_command(SwarmCommand::Dial {
            address,
            response_tx: Some(response_tx),
        })?;

        response_rx
            .await
            .map_err(|_| P2pError::NetworkShutdown)?
            .map_err(P2pError::DialFailed)
    }

    pub async fn subscribe(&self, topic: &str) -> Result<bool, P2pError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.send_command(SwarmCommand::Subscribe {
            topic: topic.to_string(),
            response_tx,
        })?;

        response_rx
            .await
            .map_err(|_| P2pError::NetworkShutdown)?
            .map_err(P2pError::SubscriptionFailed)
    }

    pub fn unsubscribe(&self, topic: &str) {
        let _ = self.send_command(SwarmCommand::Unsubscribe {
            topic: topic.to_string(),
        });
    }

    pub fn publish(&self, topic: String, data: Vec<u8>) -> Result<(), P2pError> {
        self.send_command(SwarmCommand::Publish { topic, data })
    }

    pub async fn peers_on_topic(&self, topic: &str) -> Vec<PeerId> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .send_command(SwarmCommand::PeersOnTopic {
                topic: topic.to_string(),
                response_tx,
            })
            .is_err()
        {
            return Vec::new();
        }

        response_rx.await.unwrap_or_default()
    }

    // ── Shared-state reads ───────────────────────────────────────────

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.connected.contains_key(peer)
    }

    pub fn num_connected(&self) -> usize {
        self.connected.len()
    }

    pub fn connected_peer_list(&self) -> Vec<PeerId> {
        self.connected.iter().map(|entry| *entry.key()).collect()
    }

    /// Addresses of every live connection, `multiaddr/p2p/peer-id` form.
    pub fn connected_addresses(&self) -> Vec<String> {
        self.connected
            .iter()
            .flat_map(|entry| {
                let peer = *entry.key();
                entry
                    .value()
                    .iter()
                    .map(move |addr| format!("{addr}/p2p/{peer}"))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Known addresses of one peer: live connections first, then whatever
    /// the address book remembers.
    pub fn peer_addresses(&self, peer: &PeerId) -> Vec<String> {
        let mut result = Vec::new();

        if let Some(entry) = self.connected.get(peer) {
            if let Some(addr) = entry.value().first() {
                result.push(addr.to_string());
            }
        }
        if let Some(entry) = self.known_addresses.get(peer) {
            for addr in entry.value() {
                let rendered = addr.to_string();
                if !result.contains(&rendered) {
                    result.push(rendered);
                }
            }
        }

        result
    }

    /// Every peer the address book knows about, including self.
    pub fn known_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .known_addresses
            .iter()
            .map(|entry| *entry.key())
            .collect();
        if !peers.contains(&self.local_peer_id) {
            peers.push(self.local_peer_id);
        }
        peers
    }

    pub fn listen_addresses(&self) -> Vec<Multiaddr> {
        self.listen_addrs.read().clone()
    }

    /// Render the connection to a peer the way log lines and the peers-info
    /// snapshot expect it.
    pub(crate) fn connection_string(&self, peer: &PeerId) -> String {
        match self.connected.get(peer).and_then(|e| e.value().first().cloned()) {
            Some(addr) => format!("{addr}/p2p/{peer}"),
            None => INVALID_CONNECTION_STRING.to_string(),
        }
    }
}

impl ConnectionsHost for SwarmHandle {
    fn connected_peers(&self) -> Vec<PeerId> {
        self.connected_peer_list()
    }

    fn close_peer(&self, peer: &PeerId) {
        let _ = self.send_command(SwarmCommand::ClosePeer { peer: *peer });
    }
}

impl Dialer for SwarmHandle {
    fn dial_detached(&self, address: Multiaddr) {
        let _ = self.send_command(SwarmCommand::Dial {
            address,
            response_tx: None,
        });
    }
}

//! Async event loop owning the swarm.
//!
//! Processes facade commands and swarm events until the cancellation signal
//! fires. Connection bookkeeping lives in shared maps so facade reads never
//! block on the loop.

use super::command::SwarmCommand;
use super::inbound::InboundPipeline;
use super::swarm_builder::{Behaviour, BehaviourEvent};
use crate::connection_monitor::ConnectionMonitorWrapper;
use crate::metrics::ConnectionsMetric;
use dashmap::DashMap;
use futures::StreamExt;
use libp2p::gossipsub::{self, IdentTopic};
use libp2p::swarm::SwarmEvent;
use libp2p::{Multiaddr, PeerId, Swarm};
use parking_lot::RwLock;
use shardlink_core::PeerTopicNotifier;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub(crate) struct EventLoop {
    pub(crate) swarm: Swarm<Behaviour>,
    pub(crate) command_rx: mpsc::UnboundedReceiver<SwarmCommand>,
    pub(crate) cancel: CancellationToken,
    pub(crate) connected: Arc<DashMap<PeerId, Vec<Multiaddr>>>,
    pub(crate) known_addresses: Arc<DashMap<PeerId, Vec<Multiaddr>>>,
    pub(crate) listen_addrs: Arc<RwLock<Vec<Multiaddr>>>,
    pub(crate) conn_monitor: Arc<ConnectionMonitorWrapper>,
    pub(crate) connections_metric: Arc<ConnectionsMetric>,
    pub(crate) pipeline: Arc<InboundPipeline>,
    pub(crate) peer_topic_notifiers: Arc<RwLock<Vec<Arc<dyn PeerTopicNotifier>>>>,
}

impl EventLoop {
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("network event loop stopping");
                    return;
                }
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command);
                }
                event = self.swarm.select_next_some() => {
                    self.handle_event(event);
                }
            }
        }
    }

    fn handle_command(&mut self, command: SwarmCommand) {
        match command {
            SwarmCommand::Subscribe { topic, response_tx } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .subscribe(&IdentTopic::new(topic.clone()))
                    .map_err(|e| format!("{e:?}"));
                if result.is_ok() {
                    info!(topic, "subscribed to topic");
                }
                let _ = response_tx.send(result);
            }
            SwarmCommand::Unsubscribe { topic } => {
                let _ = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .unsubscribe(&IdentTopic::new(topic.clone()));
                debug!(topic, "unsubscribed from topic");
            }
            SwarmCommand::Publish { topic, data } => {
                let topic_ident = IdentTopic::new(topic);
                let data_len = data.len();
                match self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(topic_ident.clone(), data)
                {
                    // Duplicates are expected: pubsub deduplicates within
                    // its time cache.
                    Err(gossipsub::PublishError::Duplicate) => {
                        trace!(topic = %topic_ident, "gossipsub duplicate, already delivered");
                    }
                    Err(e) => {
                        warn!(
                            topic = %topic_ident,
                            data_len,
                            error = ?e,
                            "failed to publish message - message may be lost"
                        );
                    }
                    Ok(_) => {
                        trace!(topic = %topic_ident, data_len, "published message");
                    }
                }
            }
            SwarmCommand::Dial {
                address,
                response_tx,
            } => {
                let result = self
                    .swarm
                    .dial(address.clone())
                    .map_err(|e| format!("{e:?}"));
                if let Err(e) = &result {
                    debug!(address = %address, error = %e, "dial failed");
                }
                if let Some(tx) = response_tx {
                    let _ = tx.send(result);
                }
            }
            SwarmCommand::ClosePeer { peer } => {
                let _ = self.swarm.disconnect_peer_id(peer);
            }
            SwarmCommand::PeersOnTopic { topic, response_tx } => {
                let hash = IdentTopic::new(topic).hash();
                let peers = self
                    .swarm
                    .behaviour()
                    .gossipsub
                    .all_peers()
                    .filter(|(_, topics)| topics.iter().any(|t| **t == hash))
                    .map(|(peer, _)| *peer)
                    .collect();
                let _ = response_tx.send(peers);
            }
        }
    }

    fn handle_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::ConnectionEstablished {
                peer_id,
                endpoint,
                num_established,
                ..
            } => {
                let address = endpoint.get_remote_address().clone();
                self.record_address(&peer_id, address.clone());
                self.connections_metric.increment_connections();

                debug!(
                    peer = %peer_id,
                    address = %address,
                    total_connections = num_established.get(),
                    "connection established"
                );

                let connection = format!("{address}/p2p/{peer_id}");
                let keep =
                    self.conn_monitor
                        .handle_connected(&peer_id, &connection, self.connected.len());
                if !keep {
                    // The wrapper already queued the close command.
                    trace!(peer = %peer_id, "denied peer connection will be dropped");
                }
            }

            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                cause,
                ..
            } => {
                if num_established == 0 {
                    self.connected.remove(&peer_id);
                }
                self.connections_metric.increment_disconnections();
                self.conn_monitor
                    .handle_disconnected(&peer_id, self.connected.len());

                debug!(
                    peer = %peer_id,
                    remaining_connections = num_established,
                    cause = ?cause,
                    "connection closed"
                );
            }

            SwarmEvent::NewListenAddr { address, .. } => {
                info!(address = %address, "listening on address");
                self.listen_addrs.write().push(address);
            }

            SwarmEvent::ExpiredListenAddr { address, .. } => {
                self.listen_addrs.write().retain(|a| *a != address);
            }

            SwarmEvent::Behaviour(BehaviourEvent::Gossipsub(gossipsub::Event::Message {
                propagation_source,
                message_id,
                message,
            })) => {
                let topic = message.topic.as_str().to_string();
                let originator = message.source.unwrap_or(propagation_source);
                let seq_no = message.sequence_number.unwrap_or_default();

                let acceptance = self.pipeline.pubsub_acceptance(
                    &topic,
                    &message.data,
                    originator,
                    propagation_source,
                    seq_no,
                );
                let _ = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .report_message_validation_result(&message_id, &propagation_source, acceptance);
            }

            SwarmEvent::Behaviour(BehaviourEvent::Gossipsub(gossipsub::Event::Subscribed {
                peer_id,
                topic,
            })) => {
                debug!(peer = %peer_id, topic = %topic, "peer subscribed to topic");
                let notifiers = self.peer_topic_notifiers.read().clone();
                for notifier in notifiers {
                    notifier.new_peer_found(&peer_id, topic.as_str());
                }
            }

            other => {
                trace!(event = ?other, "swarm event");
            }
        }
    }

    fn record_address(&self, peer: &PeerId, address: Multiaddr) {
        let mut connected = self.connected.entry(*peer).or_default();
        if !connected.contains(&address) {
            connected.push(address.clone());
        }
        drop(connected);

        let mut known = self.known_addresses.entry(*peer).or_default();
        if !known.contains(&address) {
            known.push(address);
        }
    }
}

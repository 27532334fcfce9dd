//! Topic bookkeeping and the processor-registry operations of the facade.

use super::core::NetworkMessenger;
use crate::topic_processors::TopicProcessors;
use libp2p::PeerId;
use shardlink_core::{MessageProcessor, P2pError, PeerSubType};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything guarded by the single topics lock: joined topics and the
/// per-topic processor sets.
///
/// Writers create or unjoin topics and (un)register processors; readers are
/// the sender loop, the pubsub acceptance path and the direct handler.
#[derive(Default)]
pub(crate) struct TopicsState {
    pub(crate) topics: HashMap<String, TopicState>,
    pub(crate) processors: HashMap<String, Arc<TopicProcessors>>,
}

pub(crate) struct TopicState {
    /// Whether an outgoing load-balancer channel was created for the topic.
    #[allow(dead_code)]
    pub(crate) has_outgoing_channel: bool,
}

impl NetworkMessenger {
    /// Join a pubsub topic, optionally creating a dedicated outgoing channel
    /// for it. Joining an already created topic is a no-op.
    pub async fn create_topic(
        &self,
        name: &str,
        create_channel_for_topic: bool,
    ) -> Result<(), P2pError> {
        if self.topics.read().topics.contains_key(name) {
            return Ok(());
        }

        self.handle.subscribe(name).await?;

        let mut state = self.topics.write();
        if state.topics.contains_key(name) {
            return Ok(());
        }

        if create_channel_for_topic {
            self.outgoing.add_channel(name);
        }
        state.topics.insert(
            name.to_string(),
            TopicState {
                has_outgoing_channel: create_channel_for_topic,
            },
        );

        Ok(())
    }

    pub fn has_topic(&self, name: &str) -> bool {
        self.topics.read().topics.contains_key(name)
    }

    /// Leave every joined topic.
    pub fn unjoin_all_topics(&self) -> Result<(), P2pError> {
        let mut state = self.topics.write();
        for name in state.topics.keys() {
            self.handle.unsubscribe(name);
        }
        state.topics.clear();
        Ok(())
    }

    /// Register a processor under `identifier` on `topic`.
    ///
    /// The first registration for a topic enables validation of its inbound
    /// messages; further registrations extend the chain in order.
    pub fn register_message_processor(
        &self,
        topic: &str,
        identifier: &str,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), P2pError> {
        let mut state = self.topics.write();
        let processors = state
            .processors
            .entry(topic.to_string())
            .or_insert_with(|| Arc::new(TopicProcessors::new(topic)));

        processors.add(identifier, processor)
    }

    /// Remove the processor registered under `identifier` on `topic`.
    /// Removing the last one disables validation for the topic.
    pub fn unregister_message_processor(
        &self,
        topic: &str,
        identifier: &str,
    ) -> Result<(), P2pError> {
        let mut state = self.topics.write();
        let Some(processors) = state.processors.get(topic) else {
            return Ok(());
        };

        processors.remove(identifier)?;
        if processors.is_empty() {
            state.processors.remove(topic);
        }

        Ok(())
    }

    /// Drop every registered processor on every topic.
    pub fn unregister_all_message_processors(&self) -> Result<(), P2pError> {
        self.topics.write().processors.clear();
        Ok(())
    }

    /// Peers currently known to be subscribed to a topic, from the cache.
    pub async fn connected_peers_on_topic(&self, topic: &str) -> Vec<PeerId> {
        self.peers_on_channel.connected_peers_on_channel(topic).await
    }

    /// Subset of [`connected_peers_on_topic`](Self::connected_peers_on_topic)
    /// classified as full-history observers by the shard resolver.
    pub async fn connected_full_history_peers_on_topic(&self, topic: &str) -> Vec<PeerId> {
        let resolver = self.peer_shard_resolver.read().clone();
        self.connected_peers_on_topic(topic)
            .await
            .into_iter()
            .filter(|peer| resolver.peer_info(peer).peer_sub_type == PeerSubType::FullHistoryObserver)
            .collect()
    }
}

//! Outgoing channel load balancer.
//!
//! Named bounded FIFO queues drained by the single sender loop. Channels are
//! visited in a stable round-robin order so one busy channel cannot starve
//! another. Producers enqueue through cloned senders and only suspend when
//! their channel is full.

use libp2p::identity::Keypair;
use libp2p::PeerId;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Channel used when a producer names one that was never created.
pub const DEFAULT_SEND_CHANNEL: &str = "default send channel";

/// Queue depth of every named channel.
const CHANNEL_CAPACITY: usize = 10_000;

/// One enqueued broadcast, consumed exactly once by the sender loop.
pub struct SendableData {
    /// Application payload, wrapped in an envelope at publish time.
    pub buff: Vec<u8>,
    /// Topic to publish on.
    pub topic: String,
    /// Publish-identity override parsed at submission, if any.
    pub key: Option<Keypair>,
    /// Peer id the message is attributed to.
    pub peer: PeerId,
}

/// Multi-producer, single-consumer set of named FIFO channels.
pub struct OutgoingChannelLoadBalancer {
    state: Mutex<State>,
}

struct State {
    /// Channel names in creation order; drives the round-robin rotation.
    names: Vec<String>,
    senders: HashMap<String, mpsc::Sender<SendableData>>,
    /// Parallel to `names`.
    receivers: Vec<mpsc::Receiver<SendableData>>,
    next: usize,
    closed: bool,
}

impl OutgoingChannelLoadBalancer {
    pub fn new() -> Self {
        let balancer = Self {
            state: Mutex::new(State {
                names: Vec::new(),
                senders: HashMap::new(),
                receivers: Vec::new(),
                next: 0,
                closed: false,
            }),
        };
        balancer.add_channel(DEFAULT_SEND_CHANNEL);
        balancer
    }

    /// Create the named channel if it does not exist yet.
    pub fn add_channel(&self, name: &str) {
        let mut state = self.state.lock();
        if state.closed || state.senders.contains_key(name) {
            return;
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.names.push(name.to_string());
        state.senders.insert(name.to_string(), tx);
        state.receivers.push(rx);
    }

    /// Enqueue target for the named channel, or the default channel when the
    /// name is unknown. Producers always get a valid target.
    pub fn get_channel_or_default(&self, name: &str) -> mpsc::Sender<SendableData> {
        let state = self.state.lock();
        state
            .senders
            .get(name)
            .unwrap_or_else(|| {
                state
                    .senders
                    .get(DEFAULT_SEND_CHANNEL)
                    .expect("default send channel always exists")
            })
            .clone()
    }

    /// Pop the next available item, visiting channels round-robin.
    ///
    /// Returns `None` when every channel is empty or the balancer is closed.
    pub fn collect_one(&self) -> Option<SendableData> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }

        let len = state.receivers.len();
        for offset in 0..len {
            let idx = (state.next + offset) % len;
            if let Ok(item) = state.receivers[idx].try_recv() {
                state.next = (idx + 1) % len;
                return Some(item);
            }
        }

        None
    }

    /// Stop accepting new items. Queued items are dropped, not drained.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.receivers.clear();
        debug!("outgoing channel load balancer closed");
    }
}

impl Default for OutgoingChannelLoadBalancer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(topic: &str, byte: u8) -> SendableData {
        SendableData {
            buff: vec![byte],
            topic: topic.to_string(),
            key: None,
            peer: PeerId::random(),
        }
    }

    #[tokio::test]
    async fn test_unknown_channel_falls_back_to_default() {
        let balancer = OutgoingChannelLoadBalancer::new();

        let sender = balancer.get_channel_or_default("never created");
        sender.send(item("topic", 1)).await.unwrap();

        let collected = balancer.collect_one().unwrap();
        assert_eq!(collected.buff, vec![1]);
    }

    #[tokio::test]
    async fn test_add_channel_is_idempotent() {
        let balancer = OutgoingChannelLoadBalancer::new();
        balancer.add_channel("a");
        balancer.add_channel("a");

        balancer
            .get_channel_or_default("a")
            .send(item("a", 7))
            .await
            .unwrap();

        assert!(balancer.collect_one().is_some());
        assert!(balancer.collect_one().is_none());
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let balancer = OutgoingChannelLoadBalancer::new();
        balancer.add_channel("a");
        balancer.add_channel("b");

        let tx_a = balancer.get_channel_or_default("a");
        let tx_b = balancer.get_channel_or_default("b");
        for i in 0..100u8 {
            tx_a.send(item("a", i)).await.unwrap();
            tx_b.send(item("b", i)).await.unwrap();
        }

        let mut collected = Vec::new();
        while let Some(data) = balancer.collect_one() {
            collected.push(data.topic);
        }
        assert_eq!(collected.len(), 200);

        // With both queues loaded, consecutive pops must alternate channels:
        // the k-th item of each channel arrives within one position of the
        // other's k-th item.
        for pair in collected.chunks(2) {
            assert_ne!(pair[0], pair[1], "round-robin must alternate channels");
        }
    }

    #[tokio::test]
    async fn test_close_rejects_new_items() {
        let balancer = OutgoingChannelLoadBalancer::new();
        balancer.add_channel("a");
        let sender = balancer.get_channel_or_default("a");

        balancer.close();

        assert!(sender.send(item("a", 1)).await.is_err());
        assert!(balancer.collect_one().is_none());
    }
}

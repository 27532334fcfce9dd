//! Inbound message pipeline.
//!
//! Every message — gossip or direct — goes through the same steps: decode
//! the envelope, check its timestamp, fan out to the registered processors
//! in registration order, account the result, and credit the delivering
//! peer when everything passed.
//!
//! A message that fails to decode is severely corrupt: both the originator
//! and the delivering peer are denial-listed. A message that is merely stale
//! or premature is dropped without punishment.

use super::topics::TopicsState;
use super::{ACCEPT_MESSAGES_IN_ADVANCE, PUBSUB_TIME_CACHE_DURATION, WRONG_MESSAGE_DENIAL_DURATION};
use crate::connection_monitor::ConnectionMonitorWrapper;
use crate::direct_sender::ReceivedDirect;
use crate::topic_processors::TopicProcessors;
use libp2p::gossipsub::MessageAcceptance;
use libp2p::PeerId;
use parking_lot::RwLock;
#[cfg_attr(not(test), allow(unused_imports))]
use shardlink_core::{
    peer_short_string, Debugger, Marshaller, MessageProcessor, P2pError, P2pMessage,
    PeersRatingHandler, SyncTimer,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub(crate) struct InboundPipeline {
    local_peer: PeerId,
    marshaller: Arc<dyn Marshaller>,
    sync_timer: Arc<dyn SyncTimer>,
    topics: Arc<RwLock<TopicsState>>,
    conn_monitor: Arc<ConnectionMonitorWrapper>,
    rating_handler: Arc<dyn PeersRatingHandler>,
    debugger: Arc<dyn Debugger>,
}

impl InboundPipeline {
    pub(crate) fn new(
        local_peer: PeerId,
        marshaller: Arc<dyn Marshaller>,
        sync_timer: Arc<dyn SyncTimer>,
        topics: Arc<RwLock<TopicsState>>,
        conn_monitor: Arc<ConnectionMonitorWrapper>,
        rating_handler: Arc<dyn PeersRatingHandler>,
        debugger: Arc<dyn Debugger>,
    ) -> Self {
        Self {
            local_peer,
            marshaller,
            sync_timer,
            topics,
            conn_monitor,
            rating_handler,
            debugger,
        }
    }

    /// Validation verdict for one gossip message.
    ///
    /// Topics without registered processors have no validator; their
    /// messages pass through unexamined.
    pub(crate) fn pubsub_acceptance(
        &self,
        topic: &str,
        data: &[u8],
        originator: PeerId,
        deliverer: PeerId,
        seq_no: u64,
    ) -> MessageAcceptance {
        let Some(processors) = self.topics.read().processors.get(topic).cloned() else {
            return MessageAcceptance::Accept;
        };

        let message = match self.transform_and_check(data, originator, deliverer, topic, seq_no) {
            Ok(message) => message,
            Err(P2pError::Codec(e)) => {
                trace!(topic, error = %e, "pubsub validator - new message");
                return MessageAcceptance::Reject;
            }
            Err(e) => {
                // Stale or premature: drop without penalizing the deliverer.
                trace!(topic, error = %e, "pubsub validator - new message");
                return MessageAcceptance::Ignore;
            }
        };

        let message_ok = self.run_processors(&processors, &message, &deliverer);
        self.record_debug(topic, &deliverer, message.data.len() as u64, !message_ok);

        if message_ok {
            self.rating_handler.increase_rating(&deliverer);
            MessageAcceptance::Accept
        } else {
            MessageAcceptance::Reject
        }
    }

    /// Handle one direct message: synchronous envelope checks, asynchronous
    /// fan-out. Direct messages use their own sequence counter, so the
    /// pubsub duplicate cache is not consulted again.
    pub(crate) fn handle_direct(self: &Arc<Self>, received: ReceivedDirect) -> Result<(), P2pError> {
        let message = self.transform_and_check(
            &received.payload,
            received.from,
            received.from,
            &received.topic,
            received.seq_no,
        )?;

        let Some(processors) = self.topics.read().processors.get(&received.topic).cloned() else {
            return Err(P2pError::NoRegisteredProcessors {
                topic: received.topic,
            });
        };

        let pipeline = self.clone();
        let from = received.from;
        tokio::spawn(async move {
            let message_ok = pipeline.run_processors(&processors, &message, &from);
            pipeline
                .debugger
                .add_incoming_message(&message.topic, message.data.len() as u64, !message_ok);
            if message_ok {
                pipeline.rating_handler.increase_rating(&from);
            }
        });

        Ok(())
    }

    /// Decode the envelope and validate its timestamp.
    pub(crate) fn transform_and_check(
        &self,
        data: &[u8],
        originator: PeerId,
        deliverer: PeerId,
        topic: &str,
        seq_no: u64,
    ) -> Result<P2pMessage, P2pError> {
        let envelope = match self.marshaller.unmarshal(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                // No way to communicate with peers producing undecodable
                // envelopes; deny both ends of the delivery.
                self.deny_peer(&deliverer);
                self.deny_peer(&originator);
                return Err(e.into());
            }
        };

        let message = P2pMessage {
            peer: originator,
            data: data.to_vec(),
            payload: envelope.payload,
            seq_no,
            topic: topic.to_string(),
            version: envelope.version,
            timestamp: envelope.timestamp,
        };

        if let Err(e) = self.validate_timestamp(message.timestamp) {
            debug!(
                originator = %peer_short_string(&message.peer),
                deliverer = %peer_short_string(&deliverer),
                seq_no,
                timestamp = message.timestamp,
                error = %e,
                "received an invalid message"
            );
            self.record_debug(topic, &deliverer, data.len() as u64, true);
            return Err(e);
        }

        Ok(message)
    }

    fn validate_timestamp(&self, timestamp: i64) -> Result<(), P2pError> {
        let now = self.sync_timer.current_unix();

        let newest_accepted = now + ACCEPT_MESSAGES_IN_ADVANCE.as_secs() as i64;
        if timestamp > newest_accepted {
            return Err(P2pError::MessageTooNew { now, timestamp });
        }

        let oldest_accepted = now - PUBSUB_TIME_CACHE_DURATION.as_secs() as i64;
        if timestamp < oldest_accepted {
            return Err(P2pError::MessageTooOld { now, timestamp });
        }

        Ok(())
    }

    /// Run every processor in registration order. Each one observes the
    /// message regardless of earlier failures.
    fn run_processors(
        &self,
        processors: &TopicProcessors,
        message: &P2pMessage,
        from: &PeerId,
    ) -> bool {
        let (identifiers, handlers) = processors.snapshot();

        let mut message_ok = true;
        for (identifier, handler) in identifiers.iter().zip(handlers.iter()) {
            if let Err(e) = handler.process_received_message(message, from) {
                trace!(
                    topic = %message.topic,
                    identifier = %identifier,
                    originator = %peer_short_string(&message.peer),
                    from = %peer_short_string(from),
                    seq_no = message.seq_no,
                    error = %e,
                    "message processor failed"
                );
                message_ok = false;
            }
        }

        message_ok
    }

    fn record_debug(&self, topic: &str, from: &PeerId, size: u64, rejected: bool) {
        if *from == self.local_peer {
            self.debugger.add_outgoing_message(topic, size, rejected);
        } else {
            self.debugger.add_incoming_message(topic, size, rejected);
        }
    }

    fn deny_peer(&self, peer: &PeerId) {
        let evaluator = self.conn_monitor.peer_denial_evaluator();
        if evaluator.is_denied(peer) {
            return;
        }

        debug!(
            peer = %peer_short_string(peer),
            duration = ?WRONG_MESSAGE_DENIAL_DURATION,
            "denial-listing peer due to incompatible message"
        );

        if let Err(e) = evaluator.upsert_peer(peer, WRONG_MESSAGE_DENIAL_DURATION) {
            warn!(peer = %peer_short_string(peer), error = %e, "error denial-listing peer");
        }
    }
}

//! Outbound messaging paths of the facade.

use super::core::NetworkMessenger;
use super::MAX_SEND_BUFF_SIZE;
use crate::load_balancer::SendableData;
use crate::signer::keypair_from_secp256k1_bytes;
use libp2p::PeerId;
use shardlink_core::P2pError;
use std::sync::Arc;
use tracing::warn;

impl NetworkMessenger {
    fn check_sendable_data(buff: &[u8]) -> Result<(), P2pError> {
        if buff.len() > MAX_SEND_BUFF_SIZE {
            return Err(P2pError::MessageTooLarge {
                size: buff.len(),
                max: MAX_SEND_BUFF_SIZE,
            });
        }
        if buff.is_empty() {
            return Err(P2pError::EmptyBufferToSend);
        }
        Ok(())
    }

    async fn enqueue(&self, channel: &str, sendable: SendableData) -> Result<(), P2pError> {
        if !self.throttler.can_process() {
            return Err(P2pError::TooManyBroadcastTasks);
        }

        self.throttler.start_processing();
        let result = self
            .outgoing
            .get_channel_or_default(channel)
            .send(sendable)
            .await
            .map_err(|_| P2pError::NetworkShutdown);
        self.throttler.end_processing();

        result
    }

    /// Enqueue a broadcast and return once it is queued (not sent).
    pub async fn broadcast_on_channel_blocking(
        &self,
        channel: &str,
        topic: &str,
        buff: &[u8],
    ) -> Result<(), P2pError> {
        Self::check_sendable_data(buff)?;

        self.enqueue(
            channel,
            SendableData {
                buff: buff.to_vec(),
                topic: topic.to_string(),
                key: None,
                peer: self.id(),
            },
        )
        .await
    }

    /// Fire-and-forget variant of
    /// [`broadcast_on_channel_blocking`](Self::broadcast_on_channel_blocking);
    /// failures are logged, not surfaced.
    pub fn broadcast_on_channel(self: &Arc<Self>, channel: &str, topic: &str, buff: &[u8]) {
        let messenger = self.clone();
        let channel = channel.to_string();
        let topic = topic.to_string();
        let buff = buff.to_vec();
        tokio::spawn(async move {
            if let Err(e) = messenger
                .broadcast_on_channel_blocking(&channel, &topic, &buff)
                .await
            {
                warn!(error = %e, "p2p broadcast failed");
            }
        });
    }

    /// Broadcast using the topic name as the channel name.
    pub fn broadcast(self: &Arc<Self>, topic: &str, buff: &[u8]) {
        self.broadcast_on_channel(topic, topic, buff);
    }

    /// Blocking broadcast attributed to an ad-hoc identity.
    ///
    /// The secp256k1 key is parsed and validated here, once per submission.
    pub async fn broadcast_on_channel_blocking_using_private_key(
        &self,
        channel: &str,
        topic: &str,
        buff: &[u8],
        peer: PeerId,
        sk_bytes: &[u8],
    ) -> Result<(), P2pError> {
        let keypair = keypair_from_secp256k1_bytes(sk_bytes)?;
        Self::check_sendable_data(buff)?;

        self.enqueue(
            channel,
            SendableData {
                buff: buff.to_vec(),
                topic: topic.to_string(),
                key: Some(keypair),
                peer,
            },
        )
        .await
    }

    /// Fire-and-forget variant of
    /// [`broadcast_on_channel_blocking_using_private_key`](Self::broadcast_on_channel_blocking_using_private_key).
    pub fn broadcast_on_channel_using_private_key(
        self: &Arc<Self>,
        channel: &str,
        topic: &str,
        buff: &[u8],
        peer: PeerId,
        sk_bytes: &[u8],
    ) {
        let messenger = self.clone();
        let channel = channel.to_string();
        let topic = topic.to_string();
        let buff = buff.to_vec();
        let sk_bytes = sk_bytes.to_vec();
        tokio::spawn(async move {
            if let Err(e) = messenger
                .broadcast_on_channel_blocking_using_private_key(
                    &channel, &topic, &buff, peer, &sk_bytes,
                )
                .await
            {
                warn!(error = %e, "p2p broadcast using private key failed");
            }
        });
    }

    /// Broadcast with an ad-hoc identity, channel defaulting to the topic.
    pub fn broadcast_using_private_key(
        self: &Arc<Self>,
        topic: &str,
        buff: &[u8],
        peer: PeerId,
        sk_bytes: &[u8],
    ) {
        self.broadcast_on_channel_using_private_key(topic, topic, buff, peer, sk_bytes);
    }

    /// Send a message straight to a connected peer, bypassing pubsub.
    ///
    /// Sending to self routes through the local direct-message handler and
    /// never touches the wire.
    pub async fn send_to_connected_peer(
        &self,
        topic: &str,
        buff: &[u8],
        peer: PeerId,
    ) -> Result<(), P2pError> {
        Self::check_sendable_data(buff)?;

        let envelope = self.create_message_bytes(buff);
        if envelope.is_empty() {
            return Ok(());
        }

        if peer == self.id() {
            return self.send_direct_to_self(topic, envelope);
        }

        let result = self.direct_sender.send(topic, &envelope, peer).await;
        self.debugger
            .add_outgoing_message(topic, envelope.len() as u64, result.is_err());

        result
    }

    fn send_direct_to_self(&self, topic: &str, envelope: Vec<u8>) -> Result<(), P2pError> {
        let received = crate::direct_sender::ReceivedDirect {
            from: self.id(),
            seq_no: self.direct_sender.next_seq_no(),
            topic: topic.to_string(),
            payload: envelope,
        };

        self.pipeline.handle_direct(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_rejected() {
        assert!(matches!(
            NetworkMessenger::check_sendable_data(&[]),
            Err(P2pError::EmptyBufferToSend)
        ));
    }

    #[test]
    fn test_oversized_buffer_rejected() {
        let buff = vec![0u8; MAX_SEND_BUFF_SIZE + 1];
        assert!(matches!(
            NetworkMessenger::check_sendable_data(&buff),
            Err(P2pError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_maximum_buffer_accepted() {
        let buff = vec![0u8; MAX_SEND_BUFF_SIZE];
        assert!(NetworkMessenger::check_sendable_data(&buff).is_ok());
    }
}

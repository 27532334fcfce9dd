//! Direct (unicast) messaging over a dedicated stream protocol.
//!
//! Messages bypass pubsub entirely: one frame per stream, no response. The
//! sequence counter is independent from pubsub sequence numbers and seeded
//! randomly at startup.

use crate::framing::{self, MAX_FRAME_SIZE};
use futures::StreamExt;
use libp2p::{PeerId, StreamProtocol};
use libp2p_stream as stream;
use sbor::prelude::BasicSbor;
use shardlink_core::P2pError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Protocol id for sending and receiving direct messages.
pub const DIRECT_SEND_PROTOCOL: StreamProtocol = StreamProtocol::new("/drt/directsend/1.0.0");

/// Timeout for reading or writing one direct-send frame.
const STREAM_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire frame of the direct-send protocol. `payload` carries the raw
/// marshalled envelope bytes.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
struct DirectFrame {
    seq_no: u64,
    topic: String,
    payload: Vec<u8>,
}

/// A direct message delivered by a remote peer.
#[derive(Debug, Clone)]
pub struct ReceivedDirect {
    pub from: PeerId,
    pub seq_no: u64,
    pub topic: String,
    /// Raw marshalled envelope bytes.
    pub payload: Vec<u8>,
}

/// Invoked for every inbound direct message. Must be lightweight; heavy work
/// belongs on a spawned task.
pub type DirectMessageCallback = Arc<dyn Fn(ReceivedDirect) + Send + Sync>;

/// Unicast sender/receiver on [`DIRECT_SEND_PROTOCOL`].
pub struct DirectSender {
    control: stream::Control,
    seq_no: AtomicU64,
}

impl DirectSender {
    /// Create the sender and spawn the inbound accept loop.
    pub fn new(
        mut control: stream::Control,
        callback: DirectMessageCallback,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, P2pError> {
        let mut incoming = control
            .accept(DIRECT_SEND_PROTOCOL)
            .map_err(|e| P2pError::DirectSendFailed(format!("{e:?}")))?;

        let sender = Arc::new(Self {
            control,
            seq_no: AtomicU64::new(rand::random()),
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("direct sender accept loop is stopping");
                        return;
                    }
                    next = incoming.next() => {
                        let Some((peer, stream)) = next else {
                            info!("direct sender accept loop closed");
                            return;
                        };
                        let callback = callback.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_stream(peer, stream, callback).await {
                                debug!(peer = %peer, error = %e, "direct stream handling failed");
                            }
                        });
                    }
                }
            }
        });

        Ok(sender)
    }

    /// Next value of the monotonically increasing sequence counter.
    pub fn next_seq_no(&self) -> u64 {
        self.seq_no.fetch_add(1, Ordering::Relaxed)
    }

    /// Send one envelope to a connected peer and close the stream.
    pub async fn send(&self, topic: &str, payload: &[u8], peer: PeerId) -> Result<(), P2pError> {
        let frame = DirectFrame {
            seq_no: self.next_seq_no(),
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        let bytes = sbor::basic_encode(&frame)
            .map_err(|e| P2pError::DirectSendFailed(format!("{e:?}")))?;

        let mut stream = self
            .control
            .clone()
            .open_stream(peer, DIRECT_SEND_PROTOCOL)
            .await
            .map_err(|e| P2pError::DirectSendFailed(format!("{e:?}")))?;

        tokio::time::timeout(STREAM_IO_TIMEOUT, framing::write_frame(&mut stream, &bytes))
            .await
            .map_err(|_| P2pError::DirectSendFailed("stream write timeout".to_string()))?
            .map_err(|e| P2pError::DirectSendFailed(e.to_string()))?;

        trace!(peer = %peer, topic, size = bytes.len(), "sent direct message");
        Ok(())
    }
}

async fn handle_stream(
    peer: PeerId,
    mut stream: libp2p::Stream,
    callback: DirectMessageCallback,
) -> Result<(), P2pError> {
    let bytes = tokio::time::timeout(
        STREAM_IO_TIMEOUT,
        framing::read_frame(&mut stream, MAX_FRAME_SIZE),
    )
    .await
    .map_err(|_| P2pError::DirectSendFailed("stream read timeout".to_string()))?
    .map_err(|e| P2pError::DirectSendFailed(e.to_string()))?;

    let frame: DirectFrame =
        sbor::basic_decode(&bytes).map_err(|e| P2pError::DirectSendFailed(format!("{e:?}")))?;

    callback(ReceivedDirect {
        from: peer,
        seq_no: frame.seq_no,
        topic: frame.topic,
        payload: frame.payload,
    });

    Ok(())
}

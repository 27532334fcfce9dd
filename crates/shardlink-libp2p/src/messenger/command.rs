//! Commands sent from the facade to the swarm task.

use libp2p::{Multiaddr, PeerId};
use tokio::sync::oneshot;

/// One instruction for the event loop. Queries carry a oneshot for the
/// answer; fire-and-forget commands log failures inside the loop.
#[derive(Debug)]
pub(crate) enum SwarmCommand {
    /// Subscribe to a gossipsub topic. Answers `Ok(true)` on a new
    /// subscription, `Ok(false)` when already subscribed.
    Subscribe {
        topic: String,
        response_tx: oneshot::Sender<Result<bool, String>>,
    },

    /// Leave a gossipsub topic.
    Unsubscribe { topic: String },

    /// Publish pre-encoded envelope bytes on a topic.
    Publish { topic: String, data: Vec<u8> },

    /// Dial a remote address. The response reports the immediate dial
    /// outcome, not connection establishment.
    Dial {
        address: Multiaddr,
        response_tx: Option<oneshot::Sender<Result<(), String>>>,
    },

    /// Drop every connection to a peer.
    ClosePeer { peer: PeerId },

    /// Query the peers currently known to be subscribed to a topic.
    PeersOnTopic {
        topic: String,
        response_tx: oneshot::Sender<Vec<PeerId>>,
    },
}

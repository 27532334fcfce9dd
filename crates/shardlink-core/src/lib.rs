//! Core data model for the shardlink peer-to-peer messenger.
//!
//! This crate defines what the messenger exchanges and who it talks to:
//!
//! - the versioned [`TopicMessage`] envelope and its [`Marshaller`] seam
//! - the decoded [`P2pMessage`] handed to registered processors
//! - peer classification types used by the connected-peers aggregator
//! - the narrow traits for every pluggable collaborator
//! - the [`P2pError`] taxonomy
//!
//! The transport-facing implementation lives in `shardlink-libp2p`.

mod envelope;
mod error;
mod message;
mod peer_info;
mod traits;

pub use envelope::{Marshaller, SborMarshaller, TopicMessage, CURRENT_TOPIC_MESSAGE_VERSION};
pub use error::{CodecError, P2pError};
pub use message::{peer_short_string, P2pMessage};
pub use peer_info::{ConnectedPeersInfo, PeerInfo, PeerSubType, PeerType};
pub use traits::{
    Debugger, LocalSyncTimer, MessageProcessor, MessageVerifier, PeerDenialEvaluator,
    PeerDiscoverer, PeerShardResolver, PeerTopicNotifier, PeersRatingHandler,
    PreferredPeersHolder, ProcessError, Reconnecter, Sharder, SyncTimer,
};

/// Peer identifier used across the messenger API.
pub use libp2p_identity::PeerId;

//! libp2p-based network messenger for sharded nodes.
//!
//! This crate is the message orchestration layer between the application and
//! a libp2p host with gossipsub:
//!
//! - **Broadcast** with per-channel rate limiting through the
//!   [`load_balancer::OutgoingChannelLoadBalancer`] and a single sender loop
//! - **Direct messaging** to connected peers over a dedicated stream
//!   protocol ([`direct_sender::DIRECT_SEND_PROTOCOL`])
//! - **Signed, timestamp-validated envelopes** around every payload
//! - **Pluggable validation** per topic with denial-listing of peers that
//!   emit undecodable messages
//! - **Connection monitoring** enforcing the denial policy and a
//!   minimum-connectivity threshold with reconnection
//! - **Peers-on-topic caching** with TTL-driven background refresh
//!
//! Construction wires every component and spawns the background loops; all
//! of them stop on the single cancellation signal issued by
//! [`NetworkMessenger::close`].

pub mod config;
pub mod connection_monitor;
pub mod direct_sender;
pub mod disabled;
pub mod discovery;
pub mod load_balancer;
pub mod logging;
pub mod messenger;
pub mod metrics;
pub mod peers_on_channel;
pub mod signer;
pub mod throttler;
pub mod topic_processors;

mod framing;

pub use config::{NodeConfig, P2pConfig, TcpTransportConfig, TransportConfig};
pub use direct_sender::DIRECT_SEND_PROTOCOL;
pub use messenger::{
    MessageSigning, NetworkMessenger, NetworkMessengerArgs, MAX_BROADCAST_TASKS,
    MAX_SEND_BUFF_SIZE, PUBSUB_MAX_MESSAGE_SIZE,
};

// Re-export the identity types callers need to construct a messenger.
pub use libp2p::identity::Keypair;
pub use libp2p::{Multiaddr, PeerId};

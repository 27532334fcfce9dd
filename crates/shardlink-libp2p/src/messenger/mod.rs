//! The network messenger: construction, public API, and the swarm task.
//!
//! The facade never touches the libp2p swarm directly. It sends
//! [`command::SwarmCommand`]s to the event loop, which owns the swarm, and
//! reads connection state from shared maps the event loop maintains.

mod broadcast;
mod command;
mod core;
mod event_loop;
mod handle;
mod inbound;
mod peers_info;
mod stats;
mod swarm_builder;
mod topics;

pub use self::core::{NetworkMessenger, NetworkMessengerArgs};
pub use self::handle::SwarmHandle;
pub use self::swarm_builder::MessageSigning;

use std::time::Duration;

/// Ceiling for a single pubsub message, header included.
pub const PUBSUB_MAX_MESSAGE_SIZE: usize = 1 << 21;

/// Header allowance subtracted from the pubsub ceiling for user payloads.
const MESSAGE_HEADER_ALLOWANCE: usize = 64 * 1024;

/// Largest payload accepted by the broadcast and direct-send paths.
pub const MAX_SEND_BUFF_SIZE: usize = PUBSUB_MAX_MESSAGE_SIZE - MESSAGE_HEADER_ALLOWANCE;

/// How far in the past a message timestamp may lie; mirrors the pubsub
/// duplicate-cache window.
pub const PUBSUB_TIME_CACHE_DURATION: Duration = Duration::from_secs(10 * 60);

/// How far in the future a message timestamp may lie.
pub const ACCEPT_MESSAGES_IN_ADVANCE: Duration = Duration::from_secs(20);

/// Denial-list duration applied to peers involved in an undecodable message.
pub const WRONG_MESSAGE_DENIAL_DURATION: Duration = Duration::from_secs(7200);

/// Minimum delay between two consecutive outbound publishes.
const DURATION_BETWEEN_SENDS: Duration = Duration::from_micros(10);

/// Cadence of the denied-peer connection sweep.
const DURATION_CHECK_CONNECTIONS: Duration = Duration::from_secs(1);

/// Cadence of the peers-on-topic refresh loop.
const REFRESH_PEERS_INTERVAL: Duration = Duration::from_secs(3);

/// Staleness bound for a cached peers-on-topic entry.
const TTL_PEERS_ON_TOPIC: Duration = Duration::from_secs(10);

/// Poll interval inside `wait_for_connections`.
const POLL_WAIT_FOR_CONNECTIONS_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum concurrently staged broadcast submissions.
pub const MAX_BROADCAST_TASKS: usize = 1000;

/// Cadence of the connection/peer statistics log line.
const TIME_BETWEEN_PEER_PRINTS: Duration = Duration::from_secs(20);

/// Cadence of the external-logger level recheck.
const TIME_BETWEEN_EXTERNAL_LOGGERS_CHECK: Duration = Duration::from_secs(20);

/// Bind retries when the selected port is already in use.
const MAX_RETRIES_IF_BIND_ERROR: usize = 10;

//! Error taxonomy for the messenger core.

use thiserror::Error;

/// Errors raised by the messenger core.
#[derive(Debug, Error)]
pub enum P2pError {
    // ── Transport / bind ─────────────────────────────────────────────

    #[error("invalid TCP listen address: expected exactly one port placeholder")]
    InvalidTcpAddress,

    #[error("invalid QUIC listen address: expected exactly one port placeholder")]
    InvalidQuicAddress,

    #[error("invalid WebSocket listen address: expected exactly one port placeholder")]
    InvalidWsAddress,

    #[error("invalid WebTransport listen address: expected exactly one port placeholder")]
    InvalidWebTransportAddress,

    #[error("no transports defined in configuration")]
    NoTransportsDefined,

    #[error("transport bind failed: {0}")]
    BindFailed(String),

    // ── Configuration ────────────────────────────────────────────────

    #[error("invalid duration provided for {0}")]
    InvalidDurationProvided(&'static str),

    #[error("invalid value provided for {0}")]
    InvalidValue(&'static str),

    #[error("unknown connection watcher type: {0}")]
    UnknownConnectionWatcherType(String),

    // ── Runtime submission ───────────────────────────────────────────

    #[error("too many concurrent broadcast tasks")]
    TooManyBroadcastTasks,

    #[error("message too large: {size} bytes, maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("empty buffer to send")]
    EmptyBufferToSend,

    #[error("invalid private key bytes: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("dial failed: {0}")]
    DialFailed(String),

    #[error("topic subscription failed: {0}")]
    SubscriptionFailed(String),

    // ── Envelope ─────────────────────────────────────────────────────

    #[error("message too new: self timestamp {now}, message timestamp {timestamp}")]
    MessageTooNew { now: i64, timestamp: i64 },

    #[error("message too old: self timestamp {now}, message timestamp {timestamp}")]
    MessageTooOld { now: i64, timestamp: i64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    // ── Processor registry ───────────────────────────────────────────

    #[error("processor {identifier} already registered on topic {topic}")]
    ProcessorAlreadyRegistered { topic: String, identifier: String },

    #[error("processor {identifier} is not registered on topic {topic}")]
    ProcessorNotRegistered { topic: String, identifier: String },

    #[error("no registered processors for topic {topic}")]
    NoRegisteredProcessors { topic: String },

    // ── Direct send / signing ────────────────────────────────────────

    #[error("direct send failed: {0}")]
    DirectSendFailed(String),

    #[error("signature verification failed for peer {peer}")]
    InvalidSignature { peer: String },

    #[error("cannot extract a public key from peer id {peer}")]
    KeyExtractionFailed { peer: String },

    // ── Lifecycle ────────────────────────────────────────────────────

    #[error("network messenger is shutting down")]
    NetworkShutdown,
}

/// Errors from envelope marshalling.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("marshal failed: {0}")]
    Marshal(String),

    #[error("unmarshal failed: {0}")]
    Unmarshal(String),

    #[error("empty payload")]
    EmptyPayload,

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),
}

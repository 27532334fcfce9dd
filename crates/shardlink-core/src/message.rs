//! Decoded inbound message handed to registered processors.

use libp2p_identity::PeerId;

/// A received topic message after envelope decoding.
///
/// `data` is the raw wire envelope as delivered by the transport; `payload`
/// is the application bytes extracted from it. Debug accounting uses the wire
/// size, processors consume the payload.
#[derive(Debug, Clone)]
pub struct P2pMessage {
    /// Peer that originally published the message (not necessarily the
    /// peer that delivered it to us).
    pub peer: PeerId,
    /// Raw marshalled envelope bytes.
    pub data: Vec<u8>,
    /// Application payload carried inside the envelope.
    pub payload: Vec<u8>,
    /// Transport-level sequence number of the message.
    pub seq_no: u64,
    /// Topic the message was published on.
    pub topic: String,
    /// Envelope format version.
    pub version: u8,
    /// Sender wall clock, seconds since the Unix epoch.
    pub timestamp: i64,
}

/// Short printable form of a peer id for log lines.
pub fn peer_short_string(peer: &PeerId) -> String {
    let full = peer.to_base58();
    match full.char_indices().nth_back(11) {
        Some((idx, _)) => format!("…{}", &full[idx..]),
        None => full,
    }
}

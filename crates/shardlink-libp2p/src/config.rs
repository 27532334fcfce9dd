//! Messenger configuration.
//!
//! Plain structs with defaults; loading them from files or flags is the
//! application's concern.

use shardlink_core::P2pError;

/// Placeholder every non-empty listen-address template must contain exactly
/// once; replaced with the selected port at startup.
pub const PORT_PLACEHOLDER: &str = "{port}";

/// Top-level messenger configuration.
#[derive(Debug, Clone, Default)]
pub struct P2pConfig {
    pub node: NodeConfig,
}

/// Node-level settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Listen port. `0` selects a free port at startup.
    pub port: u16,

    /// Listen-address templates per transport.
    pub transports: TransportConfig,

    /// Minimum connected peers before the connection monitor triggers a
    /// reconnection attempt.
    pub threshold_min_connected_peers: usize,

    /// Connection watcher kind: `"print"`, `"disabled"` or empty.
    pub connection_watcher_type: String,

    /// Seed addresses dialed at bootstrap. Empty disables discovery.
    pub initial_peer_list: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 0,
            transports: TransportConfig::default(),
            threshold_min_connected_peers: 0,
            connection_watcher_type: String::new(),
            initial_peer_list: Vec::new(),
        }
    }
}

/// Listen-address templates. An empty template disables that transport for
/// listening; at least one must be non-empty.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tcp: TcpTransportConfig,
    /// e.g. `/ip4/0.0.0.0/udp/{port}/quic-v1`
    pub quic_address: String,
    /// e.g. `/ip4/0.0.0.0/tcp/{port}/ws`
    pub web_socket_address: String,
    /// e.g. `/ip4/0.0.0.0/udp/{port}/quic-v1/webtransport`
    pub web_transport_address: String,
}

#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// e.g. `/ip4/0.0.0.0/tcp/{port}`
    pub listen_address: String,
    /// Request a listener socket without port reuse.
    pub prevent_port_reuse: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tcp: TcpTransportConfig {
                listen_address: format!("/ip4/0.0.0.0/tcp/{PORT_PLACEHOLDER}"),
                prevent_port_reuse: false,
            },
            quic_address: String::new(),
            web_socket_address: String::new(),
            web_transport_address: String::new(),
        }
    }
}

/// Check that a template carries exactly one port placeholder.
pub(crate) fn has_single_port_marker(template: &str) -> bool {
    template.matches(PORT_PLACEHOLDER).count() == 1
}

/// Substitute the selected port into a validated template.
pub(crate) fn fill_port(template: &str, port: u16) -> String {
    template.replace(PORT_PLACEHOLDER, &port.to_string())
}

/// Connection watcher selection parsed from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionWatcherKind {
    Print,
    Disabled,
}

impl ConnectionWatcherKind {
    /// Parse the configured watcher type. Empty means disabled.
    pub fn parse(value: &str) -> Result<Self, P2pError> {
        match value {
            "print" => Ok(Self::Print),
            "disabled" | "" => Ok(Self::Disabled),
            other => Err(P2pError::UnknownConnectionWatcherType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_marker_validation() {
        assert!(has_single_port_marker("/ip4/0.0.0.0/tcp/{port}"));
        assert!(!has_single_port_marker("/ip4/0.0.0.0/tcp/4001"));
        assert!(!has_single_port_marker("/ip4/0.0.0.0/tcp/{port}/ws/{port}"));
    }

    #[test]
    fn test_fill_port() {
        assert_eq!(
            fill_port("/ip4/0.0.0.0/tcp/{port}", 4001),
            "/ip4/0.0.0.0/tcp/4001"
        );
    }

    #[test]
    fn test_watcher_kind_parse() {
        assert_eq!(
            ConnectionWatcherKind::parse("print").unwrap(),
            ConnectionWatcherKind::Print
        );
        assert_eq!(
            ConnectionWatcherKind::parse("").unwrap(),
            ConnectionWatcherKind::Disabled
        );
        assert_eq!(
            ConnectionWatcherKind::parse("disabled").unwrap(),
            ConnectionWatcherKind::Disabled
        );
        assert!(matches!(
            ConnectionWatcherKind::parse("bogus"),
            Err(P2pError::UnknownConnectionWatcherType(_))
        ));
    }
}

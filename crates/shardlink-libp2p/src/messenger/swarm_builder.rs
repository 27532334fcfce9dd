//! Swarm construction: transports, listen addresses, and port selection.

use super::{MAX_RETRIES_IF_BIND_ERROR, PUBSUB_MAX_MESSAGE_SIZE, PUBSUB_TIME_CACHE_DURATION};
use crate::config::{fill_port, has_single_port_marker, TransportConfig};
use libp2p::swarm::NetworkBehaviour;
use libp2p::{gossipsub, identity, noise, tcp, yamux, Multiaddr, Swarm, SwarmBuilder};
use libp2p_stream as stream;
use shardlink_core::P2pError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Idle connections are kept alive this long; direct-send streams are short
/// lived and must not tear the connection down between messages.
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Combined network behaviour: gossip broadcast plus raw streams for the
/// direct-send protocol.
#[derive(NetworkBehaviour)]
pub(crate) struct Behaviour {
    pub(crate) gossipsub: gossipsub::Behaviour,
    pub(crate) stream: stream::Behaviour,
}

/// Whether pubsub messages carry a verified sender signature.
/// Disabling is meant for tests only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSigning {
    Enabled,
    Disabled,
}

/// Resolve the listen port: the configured one, or a free port when 0.
///
/// The chosen port is probe-bound first so "address already in use" is
/// reported synchronously; the probe retries with a fresh port (when the
/// configuration allows one) up to [`MAX_RETRIES_IF_BIND_ERROR`] times.
pub(crate) fn select_port(configured: u16) -> Result<u16, P2pError> {
    let mut last_error = String::new();

    for attempt in 0..MAX_RETRIES_IF_BIND_ERROR {
        let candidate = if configured != 0 {
            configured
        } else {
            free_port()?
        };

        match std::net::TcpListener::bind(("0.0.0.0", candidate)) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!(port = candidate, attempt = attempt + 1, "bind error, retrying");
                last_error = e.to_string();
            }
            Err(e) => return Err(P2pError::BindFailed(e.to_string())),
        }
    }

    Err(P2pError::BindFailed(last_error))
}

fn free_port() -> Result<u16, P2pError> {
    let listener = std::net::TcpListener::bind(("0.0.0.0", 0))
        .map_err(|e| P2pError::BindFailed(e.to_string()))?;
    let port = listener
        .local_addr()
        .map_err(|e| P2pError::BindFailed(e.to_string()))?
        .port();
    Ok(port)
}

/// Validate the transport templates and expand them into listen addresses.
///
/// Every non-empty template must contain exactly one port placeholder; with
/// no template at all the node would be unreachable, which is a
/// configuration error.
pub(crate) fn parse_transport_addresses(
    config: &TransportConfig,
    port: u16,
) -> Result<Vec<Multiaddr>, P2pError> {
    let mut templates: Vec<&str> = Vec::new();

    let tcp_template = config.tcp.listen_address.as_str();
    if !tcp_template.is_empty() {
        if !has_single_port_marker(tcp_template) {
            return Err(P2pError::InvalidTcpAddress);
        }
        templates.push(tcp_template);
        if config.tcp.prevent_port_reuse {
            debug!("tcp port reuse prevention requested");
        }
    }

    if !config.quic_address.is_empty() {
        if !has_single_port_marker(&config.quic_address) {
            return Err(P2pError::InvalidQuicAddress);
        }
        templates.push(config.quic_address.as_str());
    }

    if !config.web_socket_address.is_empty() {
        if !has_single_port_marker(&config.web_socket_address) {
            return Err(P2pError::InvalidWsAddress);
        }
        templates.push(config.web_socket_address.as_str());
    }

    let mut any_defined = !templates.is_empty();
    if !config.web_transport_address.is_empty() {
        if !has_single_port_marker(&config.web_transport_address) {
            return Err(P2pError::InvalidWebTransportAddress);
        }
        // Server-side WebTransport is not available in rust-libp2p; the
        // template is validated but not listened on.
        warn!(
            template = %config.web_transport_address,
            "webtransport listening is not supported, address ignored"
        );
        any_defined = true;
    }

    if !any_defined {
        return Err(P2pError::NoTransportsDefined);
    }

    templates
        .into_iter()
        .map(|template| {
            let filled = fill_port(template, port);
            filled
                .parse::<Multiaddr>()
                .map_err(|e| P2pError::InvalidAddress(format!("{filled}: {e}")))
        })
        .collect()
}

/// Build the swarm with TCP, QUIC and WebSocket transports installed and the
/// gossipsub/stream behaviours configured.
///
/// Returns the stream control handle alongside the swarm so the direct
/// sender can be wired before the event loop takes ownership.
pub(crate) async fn build_swarm(
    keypair: identity::Keypair,
    signing: MessageSigning,
) -> Result<(Swarm<Behaviour>, stream::Control), P2pError> {
    let mut gossipsub_config = gossipsub::ConfigBuilder::default();
    gossipsub_config
        .max_transmit_size(PUBSUB_MAX_MESSAGE_SIZE)
        .duplicate_cache_time(PUBSUB_TIME_CACHE_DURATION)
        // Messages are accepted only after the registered processors ran;
        // the event loop reports the verdict back to gossipsub.
        .validate_messages();

    let authenticity = match signing {
        MessageSigning::Enabled => {
            gossipsub_config.validation_mode(gossipsub::ValidationMode::Strict);
            gossipsub::MessageAuthenticity::Signed(keypair.clone())
        }
        MessageSigning::Disabled => {
            warn!("message signature verification is turned off, do not use in production");
            gossipsub_config.validation_mode(gossipsub::ValidationMode::Permissive);
            gossipsub::MessageAuthenticity::RandomAuthor
        }
    };

    let gossipsub_config = gossipsub_config.build().map_err(|e| {
        warn!(error = %e, "invalid gossipsub configuration");
        P2pError::InvalidValue("gossipsub configuration")
    })?;

    let gossipsub = gossipsub::Behaviour::new(authenticity, gossipsub_config).map_err(|e| {
        warn!(error = %e, "gossipsub behaviour rejected");
        P2pError::InvalidValue("gossipsub behaviour")
    })?;

    let stream_behaviour = stream::Behaviour::new();
    let stream_control = stream_behaviour.new_control();

    let swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default().nodelay(true),
            noise::Config::new,
            yamux::Config::default,
        )
        .map_err(|e| P2pError::BindFailed(e.to_string()))?
        .with_quic()
        .with_dns()
        .map_err(|e| P2pError::BindFailed(e.to_string()))?
        .with_websocket(noise::Config::new, yamux::Config::default)
        .await
        .map_err(|e| P2pError::BindFailed(e.to_string()))?
        .with_behaviour(|_| Behaviour {
            gossipsub,
            stream: stream_behaviour,
        })
        .map_err(|_| P2pError::InvalidValue("swarm behaviour"))?
        .with_swarm_config(|c| c.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
        .build();

    info!("swarm built with tcp, quic and websocket transports");

    Ok((swarm, stream_control))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TcpTransportConfig;

    fn transports(tcp: &str, quic: &str, ws: &str, wt: &str) -> TransportConfig {
        TransportConfig {
            tcp: TcpTransportConfig {
                listen_address: tcp.to_string(),
                prevent_port_reuse: false,
            },
            quic_address: quic.to_string(),
            web_socket_address: ws.to_string(),
            web_transport_address: wt.to_string(),
        }
    }

    #[test]
    fn test_no_transports_defined() {
        let config = transports("", "", "", "");
        assert!(matches!(
            parse_transport_addresses(&config, 4001),
            Err(P2pError::NoTransportsDefined)
        ));
    }

    #[test]
    fn test_invalid_templates_rejected() {
        let bad = "/ip4/0.0.0.0/tcp/4001";

        let config = transports(bad, "", "", "");
        assert!(matches!(
            parse_transport_addresses(&config, 4001),
            Err(P2pError::InvalidTcpAddress)
        ));

        let config = transports("", bad, "", "");
        assert!(matches!(
            parse_transport_addresses(&config, 4001),
            Err(P2pError::InvalidQuicAddress)
        ));

        let config = transports("", "", bad, "");
        assert!(matches!(
            parse_transport_addresses(&config, 4001),
            Err(P2pError::InvalidWsAddress)
        ));

        let config = transports("", "", "", bad);
        assert!(matches!(
            parse_transport_addresses(&config, 4001),
            Err(P2pError::InvalidWebTransportAddress)
        ));
    }

    #[test]
    fn test_templates_expand_with_port() {
        let config = transports(
            "/ip4/0.0.0.0/tcp/{port}",
            "/ip4/0.0.0.0/udp/{port}/quic-v1",
            "/ip4/0.0.0.0/tcp/{port}/ws",
            "",
        );

        let addresses = parse_transport_addresses(&config, 4001).unwrap();
        assert_eq!(addresses.len(), 3);
        assert_eq!(addresses[0].to_string(), "/ip4/0.0.0.0/tcp/4001");
        assert_eq!(addresses[1].to_string(), "/ip4/0.0.0.0/udp/4001/quic-v1");
        assert_eq!(addresses[2].to_string(), "/ip4/0.0.0.0/tcp/4001/ws");
    }

    #[test]
    fn test_webtransport_only_is_defined_but_unlistened() {
        let config = transports("", "", "", "/ip4/0.0.0.0/udp/{port}/quic-v1/webtransport");
        let addresses = parse_transport_addresses(&config, 4001).unwrap();
        assert!(addresses.is_empty());
    }

    #[test]
    fn test_select_port_zero_yields_free_port() {
        let port = select_port(0).unwrap();
        assert_ne!(port, 0);
    }

    #[test]
    fn test_select_port_reports_busy_port() {
        let holder = std::net::TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let busy = holder.local_addr().unwrap().port();

        assert!(matches!(
            select_port(busy),
            Err(P2pError::BindFailed(_))
        ));
    }
}

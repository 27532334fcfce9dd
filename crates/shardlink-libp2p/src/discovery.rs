//! Seed-list peer discovery.
//!
//! Discovery topology is owned by the application; this module only knows how
//! to dial a configured seed list at bootstrap and again when the connection
//! monitor asks for a reconnection.

use libp2p::Multiaddr;
use shardlink_core::{P2pError, PeerDiscoverer, Reconnecter};
use std::sync::Arc;
use tracing::{debug, info};

/// Ability to kick off a dial without waiting for its outcome.
pub trait Dialer: Send + Sync {
    fn dial_detached(&self, address: Multiaddr);
}

/// Discoverer dialing a fixed seed list.
pub struct ListsDiscoverer {
    dialer: Arc<dyn Dialer>,
    seed_addresses: Vec<Multiaddr>,
}

impl ListsDiscoverer {
    fn dial_seeds(&self) {
        for address in &self.seed_addresses {
            debug!(address = %address, "dialing seed peer");
            self.dialer.dial_detached(address.clone());
        }
    }
}

impl Reconnecter for ListsDiscoverer {
    fn reconnect_to_network(&self) {
        self.dial_seeds();
    }
}

impl PeerDiscoverer for ListsDiscoverer {
    fn bootstrap(&self) -> Result<(), P2pError> {
        info!(num_seeds = self.seed_addresses.len(), "starting network discovery");
        self.dial_seeds();
        Ok(())
    }
}

/// Discoverer used when no seed list is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiscoverer;

impl Reconnecter for NullDiscoverer {
    fn reconnect_to_network(&self) {}
}

impl PeerDiscoverer for NullDiscoverer {
    fn bootstrap(&self) -> Result<(), P2pError> {
        Ok(())
    }
}

/// Build the discoverer selected by the configured seed list.
///
/// Returns the same instance under both of its roles so callers do not rely
/// on trait upcasting.
pub fn new_peer_discoverer(
    dialer: Arc<dyn Dialer>,
    initial_peer_list: &[String],
) -> Result<(Arc<dyn PeerDiscoverer>, Arc<dyn Reconnecter>), P2pError> {
    if initial_peer_list.is_empty() {
        let discoverer = Arc::new(NullDiscoverer);
        return Ok((discoverer.clone(), discoverer));
    }

    let seed_addresses = initial_peer_list
        .iter()
        .map(|raw| {
            raw.parse::<Multiaddr>()
                .map_err(|e| P2pError::InvalidAddress(format!("{raw}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let discoverer = Arc::new(ListsDiscoverer {
        dialer,
        seed_addresses,
    });
    Ok((discoverer.clone(), discoverer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct DialerSpy {
        dialed: Mutex<Vec<Multiaddr>>,
    }

    impl Dialer for DialerSpy {
        fn dial_detached(&self, address: Multiaddr) {
            self.dialed.lock().push(address);
        }
    }

    #[test]
    fn test_empty_seed_list_yields_null_discoverer() {
        let dialer = Arc::new(DialerSpy::default());
        let (discoverer, reconnecter) = new_peer_discoverer(dialer.clone(), &[]).unwrap();

        discoverer.bootstrap().unwrap();
        reconnecter.reconnect_to_network();
        assert!(dialer.dialed.lock().is_empty());
    }

    #[test]
    fn test_seeds_dialed_on_bootstrap_and_reconnect() {
        let dialer = Arc::new(DialerSpy::default());
        let seeds = vec![
            "/ip4/10.0.0.1/tcp/4001".to_string(),
            "/ip4/10.0.0.2/tcp/4001".to_string(),
        ];
        let (discoverer, reconnecter) = new_peer_discoverer(dialer.clone(), &seeds).unwrap();

        discoverer.bootstrap().unwrap();
        assert_eq!(dialer.dialed.lock().len(), 2);

        reconnecter.reconnect_to_network();
        assert_eq!(dialer.dialed.lock().len(), 4);
    }

    #[test]
    fn test_invalid_seed_address_rejected() {
        let dialer = Arc::new(DialerSpy::default());
        let result = new_peer_discoverer(dialer, &["not a multiaddr".to_string()]);
        assert!(matches!(result, Err(P2pError::InvalidAddress(_))));
    }
}

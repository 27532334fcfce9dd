//! Process-scoped logging facade.
//!
//! Installs a `tracing` subscriber with a reloadable filter. The libp2p
//! internals are noisy at debug level, so their targets are pinned to `warn`
//! unless the caller's directives say otherwise; the periodic recheck loop
//! re-applies the directives in case an external layer changed them.

use parking_lot::RwLock;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Log targets of external subsystems kept quiet by default.
pub const EXTERNAL_LOG_TARGETS: &[&str] = &[
    "libp2p_gossipsub",
    "libp2p_swarm",
    "libp2p_tcp",
    "libp2p_quic",
    "libp2p_noise",
    "yamux",
];

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();
static DIRECTIVES: RwLock<String> = RwLock::new(String::new());

fn build_filter(directives: &str) -> EnvFilter {
    let mut filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    for target in EXTERNAL_LOG_TARGETS {
        if directives.contains(target) {
            continue;
        }
        if let Ok(directive) = format!("{target}=warn").parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Install the global subscriber. Returns `false` when another subscriber is
/// already installed (the handle is then unavailable and refreshes no-op).
pub fn init(directives: &str) -> bool {
    let (filter_layer, handle) = reload::Layer::new(build_filter(directives));
    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        let _ = FILTER_HANDLE.set(handle);
        *DIRECTIVES.write() = directives.to_string();
    }
    installed
}

/// Re-apply the stored directives, restoring external targets to their
/// configured levels.
pub fn refresh_external_levels() {
    if let Some(handle) = FILTER_HANDLE.get() {
        let directives = DIRECTIVES.read().clone();
        let _ = handle.reload(build_filter(&directives));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_bad_directives() {
        // Falls back to "info" instead of panicking.
        let _ = build_filter("not==valid==");
    }

    #[test]
    fn test_refresh_without_init_is_noop() {
        refresh_external_levels();
    }
}

//! Cached, periodically refreshed index of peers per topic.
//!
//! Queries are answered from the cache; a miss triggers a synchronous fetch
//! through the delegate (normally the pubsub peers-on-topic query). A
//! background loop re-fetches entries whose last update is older than the TTL.

use futures::future::BoxFuture;
use libp2p::PeerId;
use parking_lot::RwLock;
use shardlink_core::{P2pError, PeersRatingHandler};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Delegate answering "which peers are on this topic right now".
pub type PeersFetcher = Arc<dyn Fn(String) -> BoxFuture<'static, Vec<PeerId>> + Send + Sync>;

struct TopicEntry {
    peers: Vec<PeerId>,
    last_updated: Instant,
}

/// Per-topic peer cache with TTL-driven background refresh.
pub struct PeersOnChannel {
    rating_handler: Arc<dyn PeersRatingHandler>,
    fetcher: PeersFetcher,
    entries: RwLock<HashMap<String, TopicEntry>>,
    ttl: Duration,
    cancel: CancellationToken,
}

impl PeersOnChannel {
    /// Create the cache and spawn its refresh loop.
    ///
    /// `cancel` is the messenger's cancellation signal; the loop exits at
    /// most one `refresh_interval` after it fires.
    pub fn new(
        rating_handler: Arc<dyn PeersRatingHandler>,
        fetcher: PeersFetcher,
        refresh_interval: Duration,
        ttl: Duration,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, P2pError> {
        if refresh_interval.is_zero() {
            return Err(P2pError::InvalidDurationProvided("refresh interval"));
        }
        if ttl.is_zero() {
            return Err(P2pError::InvalidDurationProvided("peers on topic ttl"));
        }

        let cache = Arc::new(Self {
            rating_handler,
            fetcher,
            entries: RwLock::new(HashMap::new()),
            ttl,
            cancel,
        });

        let loop_cache = cache.clone();
        tokio::spawn(async move {
            loop_cache.refresh_loop(refresh_interval).await;
        });

        Ok(cache)
    }

    /// Known peers on a topic; a cold topic triggers a synchronous fetch.
    pub async fn connected_peers_on_channel(&self, topic: &str) -> Vec<PeerId> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(topic) {
                return entry.peers.clone();
            }
        }

        self.refresh_topic(topic).await
    }

    async fn refresh_topic(&self, topic: &str) -> Vec<PeerId> {
        let peers = (self.fetcher)(topic.to_string()).await;
        for peer in &peers {
            self.rating_handler.add_peer(peer);
        }

        trace!(topic, num_peers = peers.len(), "refreshed peers on topic");

        let mut entries = self.entries.write();
        entries.insert(
            topic.to_string(),
            TopicEntry {
                peers: peers.clone(),
                last_updated: Instant::now(),
            },
        );

        peers
    }

    async fn refresh_loop(&self, refresh_interval: Duration) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("peers-on-channel refresh loop is stopping");
                    return;
                }
                _ = tokio::time::sleep(refresh_interval) => {}
            }

            let stale: Vec<String> = {
                let entries = self.entries.read();
                entries
                    .iter()
                    .filter(|(_, entry)| entry.last_updated.elapsed() > self.ttl)
                    .map(|(topic, _)| topic.clone())
                    .collect()
            };

            for topic in stale {
                self.refresh_topic(&topic).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RatingSpy {
        added: AtomicUsize,
    }

    impl PeersRatingHandler for RatingSpy {
        fn add_peer(&self, _peer: &PeerId) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }

        fn increase_rating(&self, _peer: &PeerId) {}
    }

    fn counting_fetcher(calls: Arc<AtomicUsize>, peers: Vec<PeerId>) -> PeersFetcher {
        Arc::new(move |_topic| {
            calls.fetch_add(1, Ordering::SeqCst);
            let peers = peers.clone();
            Box::pin(async move { peers })
        })
    }

    #[tokio::test]
    async fn test_zero_durations_rejected() {
        let fetcher = counting_fetcher(Arc::default(), Vec::new());
        let rating = Arc::new(RatingSpy::default());

        assert!(matches!(
            PeersOnChannel::new(
                rating.clone(),
                fetcher.clone(),
                Duration::ZERO,
                Duration::from_secs(1),
                CancellationToken::new(),
            ),
            Err(P2pError::InvalidDurationProvided(_))
        ));
        assert!(matches!(
            PeersOnChannel::new(
                rating,
                fetcher,
                Duration::from_secs(1),
                Duration::ZERO,
                CancellationToken::new(),
            ),
            Err(P2pError::InvalidDurationProvided(_))
        ));
    }

    #[tokio::test]
    async fn test_cold_topic_fetches_and_rates_peers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let peers = vec![PeerId::random(), PeerId::random()];
        let rating = Arc::new(RatingSpy::default());

        let cache = PeersOnChannel::new(
            rating.clone(),
            counting_fetcher(calls.clone(), peers.clone()),
            Duration::from_secs(60),
            Duration::from_secs(60),
            CancellationToken::new(),
        )
        .unwrap();

        let resolved = cache.connected_peers_on_channel("topic").await;
        assert_eq!(resolved, peers);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rating.added.load(Ordering::SeqCst), 2);

        // Warm hit: no extra fetch.
        let cached = cache.connected_peers_on_channel("topic").await;
        assert_eq!(cached, peers);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_background_loop_refreshes_stale_entries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = PeersOnChannel::new(
            Arc::new(RatingSpy::default()),
            counting_fetcher(calls.clone(), vec![PeerId::random()]),
            Duration::from_millis(10),
            Duration::from_millis(30),
            CancellationToken::new(),
        )
        .unwrap();

        cache.connected_peers_on_channel("topic").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Entry turns stale after the TTL; the loop re-fetches it.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_loop_stops_on_cancellation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let cache = PeersOnChannel::new(
            Arc::new(RatingSpy::default()),
            counting_fetcher(calls.clone(), Vec::new()),
            Duration::from_millis(10),
            Duration::from_millis(10),
            cancel.clone(),
        )
        .unwrap();

        cache.connected_peers_on_channel("topic").await;
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after_cancel = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_cancel);
    }
}

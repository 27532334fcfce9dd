//! Messenger construction, lifecycle, and connectivity API.

use super::event_loop::EventLoop;
use super::handle::SwarmHandle;
use super::inbound::InboundPipeline;
use super::swarm_builder::{self, MessageSigning};
use super::topics::TopicsState;
use super::{
    DURATION_BETWEEN_SENDS, DURATION_CHECK_CONNECTIONS, MAX_BROADCAST_TASKS,
    POLL_WAIT_FOR_CONNECTIONS_INTERVAL, REFRESH_PEERS_INTERVAL, TTL_PEERS_ON_TOPIC,
};
use crate::config::P2pConfig;
use crate::connection_monitor::{ConnectionMonitorWrapper, SimpleConnectionMonitor};
use crate::direct_sender::{DirectMessageCallback, DirectSender};
use crate::disabled::{DisabledPeerDenialEvaluator, UnknownPeerShardResolver};
use crate::discovery::new_peer_discoverer;
use crate::load_balancer::OutgoingChannelLoadBalancer;
use crate::metrics::{
    new_connections_watcher, ConnectionsMetric, ConnectionsWatcher, TTL_CONNECTIONS_WATCHER,
};
use crate::peers_on_channel::{PeersFetcher, PeersOnChannel};
use crate::signer::P2pSigner;
use crate::throttler::BroadcastThrottler;
use dashmap::DashMap;
use libp2p::{identity, Multiaddr, PeerId};
use parking_lot::RwLock;
use shardlink_core::{
    Debugger, Marshaller, P2pError, PeerDenialEvaluator, PeerDiscoverer, PeerShardResolver,
    PeerTopicNotifier, PeersRatingHandler, PreferredPeersHolder, Sharder, SyncTimer, TopicMessage,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Everything a messenger needs at construction. All collaborators are
/// required; swappable ones start from the defaults in [`crate::disabled`]
/// and are replaced through the setters.
pub struct NetworkMessengerArgs {
    pub config: P2pConfig,
    pub keypair: identity::Keypair,
    pub marshaller: Arc<dyn Marshaller>,
    pub sync_timer: Arc<dyn SyncTimer>,
    pub preferred_peers_holder: Arc<dyn PreferredPeersHolder>,
    pub peers_rating_handler: Arc<dyn PeersRatingHandler>,
    pub sharder: Arc<dyn Sharder>,
    pub debugger: Arc<dyn Debugger>,
}

/// The network messenger: topic broadcast with per-channel load balancing,
/// direct messaging, pluggable validation, and peer-policy enforcement on
/// top of a libp2p host.
pub struct NetworkMessenger {
    pub(crate) cancel: CancellationToken,
    pub(crate) handle: SwarmHandle,
    port: u16,
    signer: P2pSigner,
    marshaller: Arc<dyn Marshaller>,
    sync_timer: Arc<dyn SyncTimer>,
    pub(crate) sharder: Arc<dyn Sharder>,
    pub(crate) preferred_peers_holder: Arc<dyn PreferredPeersHolder>,
    pub(crate) debugger: Arc<dyn Debugger>,
    pub(crate) peer_shard_resolver: RwLock<Arc<dyn PeerShardResolver>>,
    pub(crate) topics: Arc<RwLock<TopicsState>>,
    pub(crate) outgoing: Arc<OutgoingChannelLoadBalancer>,
    pub(crate) peers_on_channel: Arc<PeersOnChannel>,
    pub(crate) throttler: BroadcastThrottler,
    pub(crate) conn_monitor: Arc<ConnectionMonitorWrapper>,
    pub(crate) connections_metric: Arc<ConnectionsMetric>,
    connections_watcher: Arc<dyn ConnectionsWatcher>,
    peer_discoverer: Arc<dyn PeerDiscoverer>,
    pub(crate) direct_sender: Arc<DirectSender>,
    pub(crate) pipeline: Arc<InboundPipeline>,
    peer_topic_notifiers: Arc<RwLock<Vec<Arc<dyn PeerTopicNotifier>>>>,
    closed: AtomicBool,
}

impl NetworkMessenger {
    /// Create a messenger with pubsub message signing enabled.
    pub async fn new(args: NetworkMessengerArgs) -> Result<Arc<Self>, P2pError> {
        Self::new_with_message_signing(args, MessageSigning::Enabled).await
    }

    /// Create a messenger with an explicit signing policy.
    /// [`MessageSigning::Disabled`] is meant for tests only.
    pub async fn new_with_message_signing(
        args: NetworkMessengerArgs,
        signing: MessageSigning,
    ) -> Result<Arc<Self>, P2pError> {
        let port = swarm_builder::select_port(args.config.node.port)?;
        let listen_addresses =
            swarm_builder::parse_transport_addresses(&args.config.node.transports, port)?;

        let (mut swarm, stream_control) =
            swarm_builder::build_swarm(args.keypair.clone(), signing).await?;
        for address in listen_addresses {
            swarm
                .listen_on(address)
                .map_err(|e| P2pError::BindFailed(format!("{e:?}")))?;
        }

        let local_peer_id = *swarm.local_peer_id();
        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(DashMap::new());
        let known_addresses = Arc::new(DashMap::new());
        let listen_addrs: Arc<RwLock<Vec<Multiaddr>>> = Arc::default();
        let handle = SwarmHandle::new(
            local_peer_id,
            command_tx,
            connected.clone(),
            known_addresses.clone(),
            listen_addrs.clone(),
        );

        let connections_watcher = new_connections_watcher(
            &args.config.node.connection_watcher_type,
            TTL_CONNECTIONS_WATCHER,
        )?;
        let (peer_discoverer, reconnecter) = new_peer_discoverer(
            Arc::new(handle.clone()),
            &args.config.node.initial_peer_list,
        )?;
        let inner_monitor = Arc::new(SimpleConnectionMonitor::new(
            reconnecter,
            args.config.node.threshold_min_connected_peers,
            connections_watcher.clone(),
        ));
        let conn_monitor = Arc::new(ConnectionMonitorWrapper::new(
            inner_monitor,
            Arc::new(handle.clone()),
            Arc::new(DisabledPeerDenialEvaluator),
        ));

        let topics: Arc<RwLock<TopicsState>> = Arc::default();
        let pipeline = Arc::new(InboundPipeline::new(
            local_peer_id,
            args.marshaller.clone(),
            args.sync_timer.clone(),
            topics.clone(),
            conn_monitor.clone(),
            args.peers_rating_handler.clone(),
            args.debugger.clone(),
        ));

        let direct_callback: DirectMessageCallback = {
            let pipeline = pipeline.clone();
            Arc::new(move |received| {
                if let Err(e) = pipeline.handle_direct(received) {
                    debug!(error = %e, "direct message dropped");
                }
            })
        };
        let direct_sender =
            DirectSender::new(stream_control, direct_callback, cancel.child_token())?;

        let fetcher: PeersFetcher = {
            let handle = handle.clone();
            Arc::new(move |topic| {
                let handle = handle.clone();
                Box::pin(async move { handle.peers_on_topic(&topic).await })
            })
        };
        let peers_on_channel = PeersOnChannel::new(
            args.peers_rating_handler.clone(),
            fetcher,
            REFRESH_PEERS_INTERVAL,
            TTL_PEERS_ON_TOPIC,
            cancel.child_token(),
        )?;

        let connections_metric = Arc::new(ConnectionsMetric::new());
        let peer_topic_notifiers: Arc<RwLock<Vec<Arc<dyn PeerTopicNotifier>>>> = Arc::default();

        let event_loop = EventLoop {
            swarm,
            command_rx,
            cancel: cancel.child_token(),
            connected,
            known_addresses,
            listen_addrs,
            conn_monitor: conn_monitor.clone(),
            connections_metric: connections_metric.clone(),
            pipeline: pipeline.clone(),
            peer_topic_notifiers: peer_topic_notifiers.clone(),
        };
        tokio::spawn(event_loop.run());

        let messenger = Arc::new(Self {
            cancel,
            handle,
            port,
            signer: P2pSigner::new(args.keypair),
            marshaller: args.marshaller,
            sync_timer: args.sync_timer,
            sharder: args.sharder,
            preferred_peers_holder: args.preferred_peers_holder,
            debugger: args.debugger,
            peer_shard_resolver: RwLock::new(Arc::new(UnknownPeerShardResolver)),
            topics,
            outgoing: Arc::new(OutgoingChannelLoadBalancer::new()),
            peers_on_channel,
            throttler: BroadcastThrottler::new(MAX_BROADCAST_TASKS)?,
            conn_monitor,
            connections_metric,
            connections_watcher,
            peer_discoverer,
            direct_sender,
            pipeline,
            peer_topic_notifiers,
            closed: AtomicBool::new(false),
        });

        messenger.spawn_sender_loop();
        messenger.spawn_connection_sweep_loop();
        messenger.spawn_stats_loop();
        Self::spawn_external_loggers_loop(messenger.cancel.child_token());

        info!(peer = %messenger.id(), port, "network messenger created");
        Ok(messenger)
    }

    // ── Background loops ─────────────────────────────────────────────

    /// The single outbound sender: drains the load balancer round-robin,
    /// wraps each payload in an envelope, and publishes.
    fn spawn_sender_loop(self: &Arc<Self>) {
        let messenger = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = messenger.cancel.cancelled() => {
                        debug!("outbound sender loop stopping");
                        return;
                    }
                    _ = tokio::time::sleep(DURATION_BETWEEN_SENDS) => {}
                }

                let Some(sendable) = messenger.outgoing.collect_one() else {
                    continue;
                };

                let joined = messenger.topics.read().topics.contains_key(&sendable.topic);
                if !joined {
                    warn!(
                        topic = %sendable.topic,
                        "writing on a topic that the node did not join - message dropped"
                    );
                    continue;
                }

                let bytes = messenger.create_message_bytes(&sendable.buff);
                if bytes.is_empty() {
                    continue;
                }

                if sendable.key.is_some() {
                    // rust-libp2p pins the pubsub signature to the swarm
                    // identity; the override key was validated at submission.
                    trace!(topic = %sendable.topic, peer = %sendable.peer, "publish identity override requested");
                }

                if let Err(e) = messenger.handle.publish(sendable.topic, bytes) {
                    trace!(error = %e, "error sending data");
                }
            }
        });
    }

    /// Periodic sweep closing connections to denied peers.
    fn spawn_connection_sweep_loop(self: &Arc<Self>) {
        let conn_monitor = self.conn_monitor.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            loop {
                conn_monitor.check_connections_blocking();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("peer monitoring loop stopping");
                        return;
                    }
                    _ = tokio::time::sleep(DURATION_CHECK_CONNECTIONS) => {}
                }
            }
        });
    }

    /// Wrap a payload into the versioned envelope. Returns empty bytes on
    /// marshalling failure, which callers treat as "do not send".
    pub(crate) fn create_message_bytes(&self, buff: &[u8]) -> Vec<u8> {
        let message = TopicMessage::new(buff.to_vec(), self.sync_timer.current_unix());
        match self.marshaller.marshal(&message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "error sending data");
                Vec::new()
            }
        }
    }

    // ── Identity ─────────────────────────────────────────────────────

    /// The messenger's peer id.
    pub fn id(&self) -> PeerId {
        self.handle.local_peer_id()
    }

    /// Listen addresses, `multiaddr/p2p/peer-id` form.
    pub fn addresses(&self) -> Vec<String> {
        let id = self.id();
        self.handle
            .listen_addresses()
            .into_iter()
            .map(|addr| format!("{addr}/p2p/{id}"))
            .collect()
    }

    /// The port this messenger listens on.
    pub fn port(&self) -> u16 {
        self.port
    }

    // ── Connectivity ─────────────────────────────────────────────────

    /// Open a connection to a peer multiaddress.
    pub async fn connect_to_peer(&self, address: &str) -> Result<(), P2pError> {
        let address: Multiaddr = address
            .parse()
            .map_err(|e| P2pError::InvalidAddress(format!("{address}: {e}")))?;
        self.handle.dial(address).await
    }

    pub fn is_connected(&self, peer: &PeerId) -> bool {
        self.handle.is_connected(peer)
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.handle.connected_peer_list()
    }

    pub fn connected_addresses(&self) -> Vec<String> {
        self.handle.connected_addresses()
    }

    /// Known addresses of a peer, or empty when the peer is unknown.
    pub fn peer_addresses(&self, peer: &PeerId) -> Vec<String> {
        self.handle.peer_addresses(peer)
    }

    /// Every known peer, including self.
    pub fn peers(&self) -> Vec<PeerId> {
        self.handle.known_peers()
    }

    /// Start the peer discovery mechanism.
    pub fn bootstrap(&self) -> Result<(), P2pError> {
        let result = self.peer_discoverer.bootstrap();
        if result.is_ok() {
            info!("started the network discovery process");
        }
        result
    }

    /// Wait until at least `min_peers` peers are connected or `max_wait`
    /// elapsed. With `min_peers == 0` this simply sleeps `max_wait`.
    pub async fn wait_for_connections(&self, max_wait: Duration, min_peers: usize) {
        let start = Instant::now();

        if min_peers == 0 {
            debug!(?max_wait, "waiting for connections");
            tokio::time::sleep(max_wait).await;
        } else {
            let deadline = start + max_wait;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                tokio::time::sleep(POLL_WAIT_FOR_CONNECTIONS_INTERVAL.min(deadline - now)).await;
                if self.handle.num_connected() >= min_peers {
                    break;
                }
            }
        }

        debug!(
            waited = ?start.elapsed(),
            num_connected_peers = self.handle.num_connected(),
            "wait for connections done"
        );
    }

    /// Whether connectivity meets the minimum-connected-peers threshold.
    pub fn is_connected_to_the_network(&self) -> bool {
        self.conn_monitor
            .inner()
            .is_connected_to_the_network(self.handle.num_connected())
    }

    /// Set the minimum connected peers before a reconnection is triggered.
    pub fn set_threshold_min_connected_peers(&self, threshold: usize) {
        self.conn_monitor
            .inner()
            .set_threshold_min_connected_peers(threshold);
    }

    pub fn threshold_min_connected_peers(&self) -> usize {
        self.conn_monitor.inner().threshold_min_connected_peers()
    }

    // ── Policy hooks ─────────────────────────────────────────────────

    /// Swap the peer-denial policy.
    pub fn set_peer_denial_evaluator(&self, evaluator: Arc<dyn PeerDenialEvaluator>) {
        self.conn_monitor.set_peer_denial_evaluator(evaluator);
    }

    /// Swap the peer-shard resolver, propagating it to the sharder.
    pub fn set_peer_shard_resolver(&self, resolver: Arc<dyn PeerShardResolver>) {
        self.sharder.set_peer_shard_resolver(resolver.clone());
        *self.peer_shard_resolver.write() = resolver;
    }

    /// Register a notifier called whenever a new peer shows up on a topic.
    pub fn add_peer_topic_notifier(&self, notifier: Arc<dyn PeerTopicNotifier>) {
        self.peer_topic_notifiers.write().push(notifier);
        debug!("added peer topic notifier");
    }

    // ── Signing ──────────────────────────────────────────────────────

    /// Sign a payload with the host key.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, P2pError> {
        self.signer.sign(payload)
    }

    /// Verify a payload signature attributed to a peer.
    pub fn verify(&self, payload: &[u8], peer: &PeerId, signature: &[u8]) -> Result<(), P2pError> {
        use shardlink_core::MessageVerifier;
        self.signer.verify(payload, peer, signature)
    }

    /// Sign a payload with an ad-hoc secp256k1 private key.
    pub fn sign_using_private_key(
        &self,
        sk_bytes: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>, P2pError> {
        self.signer.sign_using_private_key(sk_bytes, payload)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Shut down every component. Idempotent; returns the first
    /// subcomponent error after attempting every shutdown step.
    pub fn close(&self) -> Result<(), P2pError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!("closing network messenger components");
        self.outgoing.close();
        self.debugger.close();
        self.connections_watcher.close();
        self.cancel.cancel();

        info!("network messenger closed");
        Ok(())
    }
}

impl Drop for NetworkMessenger {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

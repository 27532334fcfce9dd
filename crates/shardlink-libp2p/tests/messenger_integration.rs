//! Loopback integration tests for the network messenger.
//!
//! Each test spins up real messengers on 127.0.0.1 with OS-assigned ports.
//! Timing-sensitive assertions poll with generous deadlines instead of
//! sleeping a fixed amount.

use parking_lot::Mutex;
use shardlink_core::{
    LocalSyncTimer, MessageProcessor, P2pError, P2pMessage, PeerDenialEvaluator, ProcessError,
    SborMarshaller,
};
use shardlink_libp2p::disabled::{
    DisabledDebugger, DisabledPeersRatingHandler, DisabledPreferredPeersHolder, DisabledSharder,
};
use shardlink_libp2p::{
    Keypair, NetworkMessenger, NetworkMessengerArgs, NodeConfig, P2pConfig, PeerId,
    TcpTransportConfig, TransportConfig,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn test_args() -> NetworkMessengerArgs {
    NetworkMessengerArgs {
        config: P2pConfig {
            node: NodeConfig {
                port: 0,
                transports: TransportConfig {
                    tcp: TcpTransportConfig {
                        listen_address: "/ip4/127.0.0.1/tcp/{port}".to_string(),
                        prevent_port_reuse: false,
                    },
                    quic_address: String::new(),
                    web_socket_address: String::new(),
                    web_transport_address: String::new(),
                },
                threshold_min_connected_peers: 0,
                connection_watcher_type: String::new(),
                initial_peer_list: Vec::new(),
            },
        },
        keypair: Keypair::generate_ed25519(),
        marshaller: Arc::new(SborMarshaller),
        sync_timer: Arc::new(LocalSyncTimer),
        preferred_peers_holder: Arc::new(DisabledPreferredPeersHolder),
        peers_rating_handler: Arc::new(DisabledPeersRatingHandler),
        sharder: Arc::new(DisabledSharder),
        debugger: Arc::new(DisabledDebugger),
    }
}

async fn new_messenger() -> Arc<NetworkMessenger> {
    NetworkMessenger::new(test_args())
        .await
        .expect("messenger construction")
}

/// Poll `condition` until it holds or `deadline` elapses.
async fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    condition()
}

/// First advertised listen address of a messenger.
async fn listen_address(messenger: &Arc<NetworkMessenger>) -> String {
    assert!(
        wait_until(Duration::from_secs(5), || !messenger.addresses().is_empty()).await,
        "messenger never started listening"
    );
    messenger.addresses()[0].clone()
}

async fn connect(from: &Arc<NetworkMessenger>, to: &Arc<NetworkMessenger>) {
    let address = listen_address(to).await;
    from.connect_to_peer(&address).await.expect("dial");

    let to_id = to.id();
    assert!(
        wait_until(Duration::from_secs(5), || from.is_connected(&to_id)).await,
        "peers never connected"
    );
}

#[derive(Default)]
struct RecordingProcessor {
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl RecordingProcessor {
    fn received(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().clone()
    }
}

impl MessageProcessor for RecordingProcessor {
    fn process_received_message(
        &self,
        message: &P2pMessage,
        _from_connected_peer: &PeerId,
    ) -> Result<(), ProcessError> {
        self.payloads.lock().push(message.payload.clone());
        Ok(())
    }
}

struct DenyList {
    denied: Mutex<HashSet<PeerId>>,
}

impl DenyList {
    fn denying(peer: PeerId) -> Self {
        let mut denied = HashSet::new();
        denied.insert(peer);
        Self {
            denied: Mutex::new(denied),
        }
    }
}

impl PeerDenialEvaluator for DenyList {
    fn is_denied(&self, peer: &PeerId) -> bool {
        self.denied.lock().contains(peer)
    }

    fn upsert_peer(&self, peer: &PeerId, _duration: Duration) -> Result<(), P2pError> {
        self.denied.lock().insert(*peer);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_identity_topics_and_idempotent_close() {
    let messenger = new_messenger().await;

    assert_ne!(messenger.port(), 0);
    assert!(messenger.peers().contains(&messenger.id()));

    messenger.create_topic("blocks", true).await.unwrap();
    assert!(messenger.has_topic("blocks"));
    assert!(!messenger.has_topic("transactions"));

    // Joining again is a no-op.
    messenger.create_topic("blocks", true).await.unwrap();

    let processor = Arc::new(RecordingProcessor::default());
    messenger
        .register_message_processor("blocks", "proc", processor.clone())
        .unwrap();
    assert!(matches!(
        messenger.register_message_processor("blocks", "proc", processor),
        Err(P2pError::ProcessorAlreadyRegistered { .. })
    ));
    messenger
        .unregister_message_processor("blocks", "proc")
        .unwrap();

    messenger.close().unwrap();
    messenger.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connect_and_wait_for_connections() {
    let first = new_messenger().await;
    let second = new_messenger().await;

    connect(&first, &second).await;
    first.wait_for_connections(Duration::from_secs(5), 1).await;

    assert!(first.is_connected(&second.id()));
    assert!(second
        .connected_peers()
        .iter()
        .any(|peer| *peer == first.id()));
    assert!(!first.peer_addresses(&second.id()).is_empty());

    first.close().unwrap();
    second.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_direct_send_to_connected_peer() {
    let sender = new_messenger().await;
    let receiver = new_messenger().await;
    connect(&sender, &receiver).await;

    let processor = Arc::new(RecordingProcessor::default());
    receiver
        .register_message_processor("txs", "recorder", processor.clone())
        .unwrap();

    sender
        .send_to_connected_peer("txs", &[0xCA, 0xFE], receiver.id())
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || !processor.received().is_empty()).await,
        "direct message never arrived"
    );
    assert_eq!(processor.received()[0], vec![0xCA, 0xFE]);

    sender.close().unwrap();
    receiver.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_direct_send_to_self_loops_back() {
    let messenger = new_messenger().await;

    let processor = Arc::new(RecordingProcessor::default());
    messenger
        .register_message_processor("loopback", "recorder", processor.clone())
        .unwrap();

    messenger
        .send_to_connected_peer("loopback", &[0x01, 0x02, 0x03], messenger.id())
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || !processor.received().is_empty()).await,
        "self-send never arrived"
    );
    assert_eq!(processor.received()[0], vec![0x01, 0x02, 0x03]);

    messenger.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broadcast_reaches_subscribed_peer() {
    let publisher = new_messenger().await;
    let subscriber = new_messenger().await;
    connect(&publisher, &subscriber).await;

    publisher.create_topic("gossip", true).await.unwrap();
    subscriber.create_topic("gossip", true).await.unwrap();

    let processor = Arc::new(RecordingProcessor::default());
    subscriber
        .register_message_processor("gossip", "recorder", processor.clone())
        .unwrap();

    // The gossipsub mesh needs a moment to form; keep publishing until the
    // message lands or the deadline expires.
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut delivered = false;
    while Instant::now() < deadline {
        publisher
            .broadcast_on_channel_blocking("gossip", "gossip", &[0xAB])
            .await
            .unwrap();
        if wait_until(Duration::from_millis(500), || {
            !processor.received().is_empty()
        })
        .await
        {
            delivered = true;
            break;
        }
    }

    assert!(delivered, "broadcast never arrived");
    assert_eq!(processor.received()[0], vec![0xAB]);

    publisher.close().unwrap();
    subscriber.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_denied_peer_swept_within_two_seconds() {
    let first = new_messenger().await;
    let second = new_messenger().await;
    connect(&first, &second).await;

    let second_id = second.id();
    first.set_peer_denial_evaluator(Arc::new(DenyList::denying(second_id)));

    assert!(
        wait_until(Duration::from_secs(2), || !first.is_connected(&second_id)).await,
        "denied peer still connected after sweep interval"
    );

    first.close().unwrap();
    second.close().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_broadcast_validates_submission() {
    let messenger = new_messenger().await;
    messenger.create_topic("topic", true).await.unwrap();

    assert!(matches!(
        messenger
            .broadcast_on_channel_blocking("topic", "topic", &[])
            .await,
        Err(P2pError::EmptyBufferToSend)
    ));

    messenger.close().unwrap();
}

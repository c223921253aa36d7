//! MulticastNode: top-level coordinator for the multicast layer.
//!
//! [`MulticastNode`] is the primary public API for hive_multicast. It manages:
//! - the datagram transport (multicast socket by default)
//! - the receive loop (decode, partition filter, dispatch)
//! - the optional heartbeat loop
//! - the outbound send operations

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, DecodeOutcome, MAX_DATAGRAM_SIZE};
use crate::config::MulticastConfig;
use crate::dispatcher::{EventDispatcher, ListenerId, NetworkEvent, NetworkEventHandler};
use crate::error::NetworkError;
use crate::identity::{EntityId, NetworkId, PartitionKey};
use crate::message::{BallUpdate, Message, RectangleUpdate, Rgb};
use crate::stats::{NodeStats, StatsSnapshot};
use crate::transport::{DatagramTransport, MulticastTransport};

/// A participant in a multicast group.
///
/// Create one per session and share it by reference or `Arc`. Call
/// [`start()`](MulticastNode::start) to join the group and begin receiving.
pub struct MulticastNode {
    /// Our identity for this run. Never transmitted.
    network_id: NetworkId,
    /// Multicast configuration.
    config: MulticastConfig,
    /// Current partition key, shared with the background tasks.
    partition_key: Arc<AtomicI32>,
    /// Listener registry fed by the receive loop.
    dispatcher: Arc<EventDispatcher>,
    /// Activity counters.
    stats: Arc<NodeStats>,
    /// The open transport while running.
    transport: Option<Arc<dyn DatagramTransport>>,
    /// Shutdown signal broadcaster.
    shutdown_tx: Option<broadcast::Sender<()>>,
    /// Receive and heartbeat tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl MulticastNode {
    /// Create a stopped node with the given config.
    pub fn new(config: MulticastConfig) -> Self {
        Self {
            network_id: NetworkId::generate(),
            partition_key: Arc::new(AtomicI32::new(config.partition_key)),
            config,
            dispatcher: Arc::new(EventDispatcher::new()),
            stats: Arc::new(NodeStats::new()),
            transport: None,
            shutdown_tx: None,
            tasks: Vec::new(),
        }
    }

    /// Create a node with the default group, port and partition.
    pub fn with_defaults() -> Self {
        Self::new(MulticastConfig::default())
    }

    /// This node's identifier.
    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    /// The node's configuration.
    pub fn config(&self) -> &MulticastConfig {
        &self.config
    }

    /// The partition key stamped on outbound and required on inbound datagrams.
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey(self.partition_key.load(Ordering::Acquire))
    }

    /// Switch partitions. Takes effect for the next send and the next datagram received.
    pub fn set_partition_key(&self, key: impl Into<PartitionKey>) {
        let key = key.into();
        self.partition_key.store(key.0, Ordering::Release);
        info!("Joined network {key}");
    }

    /// Whether the node is currently running.
    pub fn is_running(&self) -> bool {
        self.transport.is_some()
    }

    /// Local address of the transport while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().and_then(|t| t.local_addr())
    }

    /// The listener registry.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Register a listener for inbound events.
    pub fn subscribe(&self, handler: Arc<dyn NetworkEventHandler>) -> ListenerId {
        self.dispatcher.subscribe(handler)
    }

    /// Remove a listener. Removing an absent listener is a no-op.
    pub fn unsubscribe(&self, handler: &Arc<dyn NetworkEventHandler>) -> bool {
        self.dispatcher.unsubscribe(handler)
    }

    /// Snapshot of the node's counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Join the configured multicast group and start the background tasks.
    ///
    /// A setup failure leaves the node stopped; sends then fail with
    /// [`NetworkError::NotRunning`].
    pub async fn start(&mut self) -> Result<(), NetworkError> {
        if self.is_running() {
            return Ok(());
        }

        let transport = MulticastTransport::open(&self.config).inspect_err(|e| {
            warn!("Multicast setup failed, networking disabled: {e}");
        })?;
        self.start_with_transport(Arc::new(transport)).await
    }

    /// Start the background tasks on an already-open transport.
    pub async fn start_with_transport(
        &mut self,
        transport: Arc<dyn DatagramTransport>,
    ) -> Result<(), NetworkError> {
        if self.is_running() {
            return Ok(());
        }

        let (shutdown_tx, _) = broadcast::channel(4);

        let link = Link {
            transport: Arc::clone(&transport),
            dispatcher: Arc::clone(&self.dispatcher),
            partition_key: Arc::clone(&self.partition_key),
            stats: Arc::clone(&self.stats),
        };

        // Spawn the receive loop.
        let receive_link = link.clone();
        let receive_shutdown = shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            receive_link.receive_loop(receive_shutdown).await;
        }));

        // Spawn heartbeat loop if configured.
        if let Some(interval) = self.config.heartbeat_interval {
            let hb_shutdown = shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(async move {
                link.heartbeat_loop(interval, hb_shutdown).await;
            }));
        }

        self.stats.mark_started();
        self.shutdown_tx = Some(shutdown_tx);
        self.transport = Some(transport);
        info!(
            "MulticastNode started (network_id: {}, partition {})",
            self.network_id,
            self.partition_key()
        );
        Ok(())
    }

    /// Stop the background tasks and release the transport.
    ///
    /// Returns once the receive loop has exited.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Background task ended abnormally: {e}");
            }
        }

        if self.transport.take().is_some() {
            info!("MulticastNode {} stopped", self.network_id);
        }
    }

    /// Encode and send one message to the group.
    pub async fn send(&self, message: &Message) -> Result<(), NetworkError> {
        let transport = self.transport.as_ref().ok_or(NetworkError::NotRunning)?;
        send_message(transport.as_ref(), &self.stats, message, self.partition_key()).await
    }

    /// Send a liveness no-op.
    pub async fn send_heartbeat(&self) -> Result<(), NetworkError> {
        self.send(&Message::Heartbeat).await
    }

    /// Send a text message. Text beyond the length cap is dropped.
    pub async fn send_text_message(&self, text: &str) -> Result<(), NetworkError> {
        self.send(&Message::Text(text.to_string())).await
    }

    /// Send the state of a ball.
    pub async fn send_ball_update(
        &self,
        id: EntityId,
        x: f64,
        y: f64,
        size: f64,
        color: Rgb,
    ) -> Result<(), NetworkError> {
        self.send(&Message::Ball(BallUpdate {
            id,
            x,
            y,
            size,
            color,
        }))
        .await
    }

    /// Send the state of a rectangle.
    pub async fn send_rectangle_update(
        &self,
        id: EntityId,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Rgb,
    ) -> Result<(), NetworkError> {
        self.send(&Message::Rectangle(RectangleUpdate {
            id,
            x,
            y,
            width,
            height,
            color,
        }))
        .await
    }
}

impl Drop for MulticastNode {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn send_message(
    transport: &dyn DatagramTransport,
    stats: &NodeStats,
    message: &Message,
    key: PartitionKey,
) -> Result<(), NetworkError> {
    let datagram = codec::encode(message, key);
    match transport.send(&datagram).await {
        Ok(()) => {
            stats.record_sent();
            trace!("Sent {:?} ({} bytes)", message.kind(), datagram.len());
            Ok(())
        }
        Err(e) => {
            stats.record_send_error();
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Internal tasks
// ---------------------------------------------------------------------------

/// Everything the background tasks share with the node.
#[derive(Clone)]
struct Link {
    transport: Arc<dyn DatagramTransport>,
    dispatcher: Arc<EventDispatcher>,
    partition_key: Arc<AtomicI32>,
    stats: Arc<NodeStats>,
}

impl Link {
    fn partition_key(&self) -> PartitionKey {
        PartitionKey(self.partition_key.load(Ordering::Acquire))
    }

    /// Receive loop: one datagram per iteration until shutdown.
    async fn receive_loop(self, mut shutdown: broadcast::Receiver<()>) {
        debug!("Receive loop started");

        // Owned by this task alone; sized for the largest datagram we produce.
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            tokio::select! {
                result = self.transport.receive(&mut buf) => {
                    match result {
                        Ok((0, from)) => {
                            self.stats.record_datagram();
                            self.stats.record_zero_length();
                            trace!("Zero-length datagram from {from}");
                        }
                        Ok((len, from)) => {
                            self.stats.record_datagram();
                            self.handle_datagram(&buf[..len], from);
                        }
                        Err(e) => {
                            self.stats.record_receive_error();
                            warn!("Receive failed: {e}");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Receive loop shutting down");
                    break;
                }
            }
        }
    }

    fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        match codec::decode(datagram, self.partition_key()) {
            DecodeOutcome::Message(message) => {
                self.stats.record_accepted();
                match NetworkEvent::from_message(message) {
                    Some(event) => {
                        trace!("Dispatching {} event from {from}", event.name());
                        let report = self.dispatcher.publish(&event);
                        self.stats.record_handler_failures(report.failed);
                    }
                    None => {
                        self.stats.record_heartbeat();
                        trace!("Heartbeat from {from}");
                    }
                }
            }
            DecodeOutcome::NotForUs { key } => {
                self.stats.record_foreign();
                trace!("Ignoring datagram for network {key} from {from}");
            }
            DecodeOutcome::Malformed(reason) => {
                self.stats.record_malformed();
                trace!("Dropping datagram from {from}: {reason}");
            }
        }
    }

    /// Heartbeat loop: sends a heartbeat at the configured interval.
    async fn heartbeat_loop(
        self,
        interval: std::time::Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let key = self.partition_key();
                    if let Err(e) = send_message(
                        self.transport.as_ref(),
                        &self.stats,
                        &Message::Heartbeat,
                        key,
                    ).await {
                        debug!("Heartbeat send failed: {e}");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Heartbeat loop shutting down");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::memory::MemoryBus;

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    async fn started_node(bus: &MemoryBus, key: i32) -> MulticastNode {
        let mut node = MulticastNode::new(MulticastConfig {
            partition_key: key,
            ..MulticastConfig::default()
        });
        node.start_with_transport(Arc::new(bus.attach()))
            .await
            .unwrap();
        node
    }

    #[test]
    fn test_node_creation() {
        let a = MulticastNode::with_defaults();
        let b = MulticastNode::with_defaults();
        assert!(!a.is_running());
        assert_ne!(a.network_id(), b.network_id());
        assert_eq!(a.partition_key(), PartitionKey(0));
        assert!(a.local_addr().is_none());
    }

    #[test]
    fn test_partition_key_from_config_and_setter() {
        let node = MulticastNode::new(MulticastConfig {
            partition_key: 7,
            ..MulticastConfig::default()
        });
        assert_eq!(node.partition_key(), PartitionKey(7));
        node.set_partition_key(9);
        assert_eq!(node.partition_key(), PartitionKey(9));
    }

    #[tokio::test]
    async fn test_send_when_not_running() {
        let node = MulticastNode::with_defaults();
        match node.send_text_message("hello").await {
            Err(NetworkError::NotRunning) => {}
            other => panic!("Expected NotRunning, got {other:?}"),
        }
        assert_eq!(node.stats().datagrams_sent, 0);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let bus = MemoryBus::default();
        let mut node = started_node(&bus, 1).await;
        assert!(node.is_running());
        assert!(node.local_addr().is_some());
        assert!(node.stats().started_at.is_some());

        // Starting again is a no-op.
        node.start_with_transport(Arc::new(bus.attach())).await.unwrap();
        assert!(node.is_running());

        node.stop().await;
        assert!(!node.is_running());
        assert!(matches!(
            node.send_heartbeat().await,
            Err(NetworkError::NotRunning)
        ));

        // Stopping twice is harmless.
        node.stop().await;
    }

    #[tokio::test]
    async fn test_sent_message_is_stamped_with_partition_key() {
        let bus = MemoryBus::default();
        let node = started_node(&bus, 42).await;
        let probe = bus.attach();

        node.send_heartbeat().await.unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = probe.receive(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0, 0, 0, 42, 0]);
        assert_eq!(node.stats().datagrams_sent, 1);
    }

    #[tokio::test]
    async fn test_receive_loop_filters_and_counts() {
        let bus = MemoryBus::default();
        let mut node = started_node(&bus, 3).await;
        let from: SocketAddr = "10.1.1.1:5000".parse().unwrap();

        bus.inject(from, &[]);
        bus.inject(from, &[0, 0, 0, 3, 77]);
        bus.inject(from, &codec::encode(&Message::Heartbeat, PartitionKey(4)));
        bus.inject(from, &codec::encode(&Message::Heartbeat, PartitionKey(3)));

        assert!(wait_for(|| node.stats().datagrams_received == 4).await);
        let stats = node.stats();
        assert_eq!(stats.zero_length_dropped, 1);
        assert_eq!(stats.malformed_dropped, 1);
        assert_eq!(stats.foreign_dropped, 1);
        assert_eq!(stats.heartbeats_received, 1);
        assert_eq!(stats.messages_accepted, 1);

        node.stop().await;
    }

    #[tokio::test]
    async fn test_partition_switch_applies_to_receive() {
        let bus = MemoryBus::default();
        let node = started_node(&bus, 1).await;
        let from: SocketAddr = "10.1.1.1:5000".parse().unwrap();

        node.set_partition_key(2);
        bus.inject(from, &codec::encode(&Message::Heartbeat, PartitionKey(2)));
        assert!(wait_for(|| node.stats().heartbeats_received == 1).await);
    }

    #[tokio::test]
    async fn test_heartbeat_loop_sends_periodically() {
        let bus = MemoryBus::default();
        let mut node = MulticastNode::new(MulticastConfig {
            partition_key: 5,
            heartbeat_interval: Some(Duration::from_millis(10)),
            ..MulticastConfig::default()
        });
        node.start_with_transport(Arc::new(bus.attach())).await.unwrap();

        // Multicast loop: our own heartbeats come back to us.
        assert!(wait_for(|| node.stats().heartbeats_received >= 2).await);
        assert!(node.stats().datagrams_sent >= 2);

        node.stop().await;
        let sent = node.stats().datagrams_sent;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(node.stats().datagrams_sent, sent);
    }

    #[tokio::test]
    async fn test_start_without_multicast_interface_stays_stopped() {
        let mut node = MulticastNode::new(MulticastConfig {
            interface: Some("no-such-interface0".to_string()),
            ..MulticastConfig::default()
        });
        assert!(node.start().await.is_err());
        assert!(!node.is_running());
        assert!(matches!(
            node.send_text_message("lost").await,
            Err(NetworkError::NotRunning)
        ));
    }
}

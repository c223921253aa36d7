//! Hive Multicast: partitioned LAN messaging over IPv4 multicast.
//!
//! This crate lets any number of processes on one network segment exchange
//! small typed messages (text, ball and rectangle state) without a server.
//! Every datagram carries a partition key; a node only delivers messages
//! whose key matches its own, so several independent sessions can share
//! one group address.
//!
//! # Architecture
//!
//! - **Transport**: a UDP socket bound to the group port with address reuse
//!   and joined to the group on one multicast-capable interface.
//! - **Codec**: a fixed big-endian binary layout, 5-byte header
//!   (partition key, type tag) followed by a type-specific payload.
//! - **Dispatch**: a listener registry that fans each inbound event out to
//!   every subscriber, isolating failing or panicking listeners.
//! - **Node**: the coordinator owning the receive loop and send operations.
//!
//! # Platform support
//!
//! Interface enumeration is implemented on unix only. Elsewhere no interface
//! is found, so [`MulticastNode::start`] fails with
//! [`NetworkError::NoInterface`]; [`MulticastNode::start_with_transport`]
//! with a [`MemoryBus`] endpoint still works.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hive_multicast::{FnHandler, MulticastConfig, MulticastNode, NetworkEvent};
//!
//! # async fn example() -> Result<(), hive_multicast::NetworkError> {
//! let mut node = MulticastNode::new(MulticastConfig {
//!     partition_key: 7,
//!     ..MulticastConfig::default()
//! });
//! node.subscribe(Arc::new(FnHandler::new(|event: &NetworkEvent| {
//!     println!("received {event:?}");
//!     Ok(())
//! })));
//!
//! node.start().await?;
//! node.send_text_message("hello").await?;
//! node.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod interface;
pub mod memory;
pub mod message;
pub mod node;
pub mod stats;
pub mod transport;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use codec::{DecodeOutcome, Malformed};
pub use config::MulticastConfig;
pub use dispatcher::{
    EventDispatcher, FnHandler, ListenerId, NetworkEvent, NetworkEventHandler, PublishReport,
};
pub use error::NetworkError;
pub use identity::{EntityId, NetworkId, PartitionKey};
pub use memory::{MemoryBus, MemoryTransport};
pub use message::{BallUpdate, Message, MessageKind, RectangleUpdate, Rgb};
pub use node::MulticastNode;
pub use stats::StatsSnapshot;
pub use transport::{DatagramTransport, MulticastTransport};

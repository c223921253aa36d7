//! Network error types.

/// Errors that can occur in the hive_multicast crate.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// No network interface is up, multicast-capable and non-loopback.
    #[error("No usable multicast interface found")]
    NoInterface,

    /// Socket creation, bind or group join failed. Fatal for the transport.
    #[error("Multicast setup failed: {0}")]
    Setup(String),

    /// A datagram could not be transmitted.
    #[error("Send error: {0}")]
    Send(#[source] std::io::Error),

    /// Receiving a datagram failed.
    #[error("Receive error: {0}")]
    Receive(#[source] std::io::Error),

    /// The node is not running (never started, failed setup, or stopped).
    #[error("Node not running")]
    NotRunning,

    /// JSON serialization / deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

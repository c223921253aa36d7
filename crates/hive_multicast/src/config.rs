//! Multicast configuration for a node.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NetworkError;

/// Default multicast group shared by all participants.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(225, 4, 5, 6);

/// Default UDP port for the multicast group.
pub const DEFAULT_PORT: u16 = 5000;

/// Configuration for the multicast layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    /// IPv4 multicast group every peer joins.
    pub group_addr: Ipv4Addr,

    /// UDP port bound locally and targeted by every send.
    pub port: u16,

    /// Logical channel; datagrams carrying another key are dropped.
    pub partition_key: i32,

    /// Interface name to join on. `None` picks the first suitable one.
    pub interface: Option<String>,

    /// Deliver our own datagrams back to local sockets.
    pub multicast_loop: bool,

    /// Hop limit for outgoing datagrams. 1 keeps traffic on the local segment.
    pub multicast_ttl: u32,

    /// Interval between heartbeat datagrams. `None` disables heartbeats.
    #[serde(with = "opt_duration_ms")]
    pub heartbeat_interval: Option<Duration>,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group_addr: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            partition_key: 0,
            interface: None,
            multicast_loop: true,
            multicast_ttl: 1,
            heartbeat_interval: None,
        }
    }
}

impl MulticastConfig {
    /// The group address and port as a socket address.
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.group_addr, self.port)
    }

    /// Save the config to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), NetworkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file, or return defaults if the file is missing.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<MulticastConfig>(&data) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Corrupt config file, using defaults: {e}");
                    }
                },
                Err(e) => {
                    tracing::warn!("Cannot read config file, using defaults: {e}");
                }
            }
        }
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match dur {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(d)?;
        Ok(ms.map(Duration::from_millis))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MulticastConfig::default();
        assert_eq!(config.group_addr, Ipv4Addr::new(225, 4, 5, 6));
        assert!(config.group_addr.is_multicast());
        assert_eq!(config.port, 5000);
        assert_eq!(config.partition_key, 0);
        assert!(config.interface.is_none());
        assert_eq!(config.multicast_ttl, 1);
        assert!(config.heartbeat_interval.is_none());
        assert_eq!(config.socket_addr().to_string(), "225.4.5.6:5000");
    }

    #[test]
    fn test_config_serialize_roundtrip() {
        let config = MulticastConfig {
            partition_key: 7,
            interface: Some("eth0".to_string()),
            heartbeat_interval: Some(Duration::from_millis(1500)),
            ..MulticastConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: MulticastConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.group_addr, config.group_addr);
        assert_eq!(deserialized.partition_key, 7);
        assert_eq!(deserialized.interface.as_deref(), Some("eth0"));
        assert_eq!(
            deserialized.heartbeat_interval,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: MulticastConfig = serde_json::from_str(r#"{"partition_key": 9}"#).unwrap();
        assert_eq!(config.partition_key, 9);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.group_addr, DEFAULT_GROUP);
    }

    #[test]
    fn test_config_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("multicast.json");

        let mut original = MulticastConfig::default();
        original.port = 5123;
        original.partition_key = -4;
        original.save_to_file(&path).unwrap();

        let loaded = MulticastConfig::load_or_default(&path);
        assert_eq!(loaded.port, 5123);
        assert_eq!(loaded.partition_key, -4);
    }

    #[test]
    fn test_config_load_missing_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = MulticastConfig::load_or_default(&dir.path().join("missing.json"));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_config_load_corrupt_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.json");
        std::fs::write(&path, "{ not json").unwrap();

        let config = MulticastConfig::load_or_default(&path);
        assert_eq!(config.partition_key, 0);
    }
}

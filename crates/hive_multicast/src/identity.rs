//! Identifiers: node identity, entity ids and partition keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for one running node. Never put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub Uuid);

impl NetworkId {
    /// Generate a new random network ID (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The 128-bit identifier of a replicated entity (ball, rectangle, ...).
///
/// Opaque: only used for equality and as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generate a new random entity ID (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an id from its most and least significant halves.
    pub fn from_halves(high: u64, low: u64) -> Self {
        Self(Uuid::from_u128(((high as u128) << 64) | low as u128))
    }

    /// Split the id into its most and least significant halves.
    pub fn halves(&self) -> (u64, u64) {
        let bits = self.0.as_u128();
        ((bits >> 64) as u64, bits as u64)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical channel key embedded in every datagram.
///
/// A cheap filter for unrelated sessions sharing a group, not a security boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PartitionKey(pub i32);

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i32> for PartitionKey {
    fn from(key: i32) -> Self {
        Self(key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_id_generation() {
        let a = NetworkId::generate();
        let b = NetworkId::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn test_entity_id_halves() {
        let id = EntityId(Uuid::from_u128(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210));
        let (high, low) = id.halves();
        assert_eq!(high, 0x0123_4567_89ab_cdef);
        assert_eq!(low, 0xfedc_ba98_7654_3210);
        assert_eq!(EntityId::from_halves(high, low), id);
    }

    #[test]
    fn test_entity_id_extreme_halves() {
        for (high, low) in [(0, 0), (u64::MAX, u64::MAX), (u64::MAX, 0), (0, u64::MAX)] {
            assert_eq!(EntityId::from_halves(high, low).halves(), (high, low));
        }
    }

    #[test]
    fn test_partition_key_display() {
        assert_eq!(PartitionKey(7).to_string(), "#7");
        assert_eq!(PartitionKey::from(-1), PartitionKey(-1));
        assert_eq!(PartitionKey::default(), PartitionKey(0));
    }
}

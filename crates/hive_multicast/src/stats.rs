//! Node counters: what the receive loop and senders have seen.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Lock-free counters updated by the receive loop and the send path.
#[derive(Debug, Default)]
pub struct NodeStats {
    datagrams_received: AtomicU64,
    messages_accepted: AtomicU64,
    heartbeats_received: AtomicU64,
    foreign_dropped: AtomicU64,
    malformed_dropped: AtomicU64,
    zero_length_dropped: AtomicU64,
    receive_errors: AtomicU64,
    handler_failures: AtomicU64,
    datagrams_sent: AtomicU64,
    send_errors: AtomicU64,
    started_at: Mutex<Option<DateTime<Utc>>>,
    last_received_at: Mutex<Option<DateTime<Utc>>>,
}

/// A point-in-time copy of [`NodeStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Every datagram the transport handed us, zero-length included.
    pub datagrams_received: u64,
    /// Datagrams decoded for our partition (heartbeats included).
    pub messages_accepted: u64,
    pub heartbeats_received: u64,
    /// Datagrams carrying another partition key.
    pub foreign_dropped: u64,
    /// Datagrams with an unknown tag or a short payload.
    pub malformed_dropped: u64,
    pub zero_length_dropped: u64,
    pub receive_errors: u64,
    /// Listener invocations that returned an error or panicked.
    pub handler_failures: u64,
    pub datagrams_sent: u64,
    pub send_errors: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_received_at: Option<DateTime<Utc>>,
}

impl NodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_started(&self) {
        *self.started_at.lock() = Some(Utc::now());
    }

    pub(crate) fn record_datagram(&self) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        *self.last_received_at.lock() = Some(Utc::now());
    }

    pub(crate) fn record_accepted(&self) {
        self.messages_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat(&self) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_foreign(&self) {
        self.foreign_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_zero_length(&self) {
        self.zero_length_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_failures(&self, failed: usize) {
        if failed > 0 {
            self.handler_failures
                .fetch_add(failed as u64, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_sent(&self) {
        self.datagrams_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            datagrams_received: self.datagrams_received.load(Ordering::Relaxed),
            messages_accepted: self.messages_accepted.load(Ordering::Relaxed),
            heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
            foreign_dropped: self.foreign_dropped.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            zero_length_dropped: self.zero_length_dropped.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            started_at: *self.started_at.lock(),
            last_received_at: *self.last_received_at.lock(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = NodeStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_record_and_snapshot() {
        let stats = NodeStats::new();
        stats.mark_started();
        stats.record_datagram();
        stats.record_datagram();
        stats.record_accepted();
        stats.record_foreign();
        stats.record_handler_failures(0);
        stats.record_handler_failures(2);
        stats.record_sent();

        let snap = stats.snapshot();
        assert_eq!(snap.datagrams_received, 2);
        assert_eq!(snap.messages_accepted, 1);
        assert_eq!(snap.foreign_dropped, 1);
        assert_eq!(snap.handler_failures, 2);
        assert_eq!(snap.datagrams_sent, 1);
        assert!(snap.started_at.is_some());
        assert!(snap.last_received_at.is_some());
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = NodeStats::new();
        stats.record_malformed();
        let json = serde_json::to_string(&stats.snapshot()).unwrap();
        let back: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.malformed_dropped, 1);
    }
}

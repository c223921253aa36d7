//! In-process datagram bus for tests and local simulation.
//!
//! A [`MemoryBus`] behaves like a multicast group on a perfect network: every
//! datagram sent by any attached [`MemoryTransport`] is delivered to all of
//! them, the sender included.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use crate::error::NetworkError;
use crate::transport::DatagramTransport;

type Datagram = (SocketAddr, Arc<[u8]>);

/// A shared in-memory "group" that transports attach to.
#[derive(Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<Datagram>,
    next_port: Arc<AtomicU16>,
}

impl MemoryBus {
    /// Create a bus buffering up to `capacity` datagrams per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            next_port: Arc::new(AtomicU16::new(40_000)),
        }
    }

    /// Attach a new endpoint with its own synthetic source address.
    pub fn attach(&self) -> MemoryTransport {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        MemoryTransport {
            addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)),
            tx: self.tx.clone(),
            rx: Mutex::new(self.tx.subscribe()),
        }
    }

    /// Put raw bytes on the bus as if `from` had sent them.
    pub fn inject(&self, from: SocketAddr, datagram: &[u8]) {
        let _ = self.tx.send((from, Arc::from(datagram)));
    }

    /// Number of endpoints currently attached.
    pub fn endpoint_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// One endpoint on a [`MemoryBus`].
pub struct MemoryTransport {
    addr: SocketAddr,
    tx: broadcast::Sender<Datagram>,
    rx: Mutex<broadcast::Receiver<Datagram>>,
}

#[async_trait]
impl DatagramTransport for MemoryTransport {
    async fn send(&self, datagram: &[u8]) -> Result<(), NetworkError> {
        self.tx
            .send((self.addr, Arc::from(datagram)))
            .map(|_| ())
            .map_err(|_| NetworkError::Send(std::io::Error::other("memory bus closed")))
    }

    async fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), NetworkError> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Ok((from, data)) => {
                // Oversized datagrams are cut like a short UDP read.
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, from))
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(NetworkError::Receive(
                std::io::Error::other(format!("receiver lagged, {skipped} datagrams lost")),
            )),
            Err(broadcast::error::RecvError::Closed) => Err(NetworkError::Receive(
                std::io::Error::other("memory bus closed"),
            )),
        }
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.addr)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Datagram transport: the multicast socket and the trait the node drives.
//!
//! [`MulticastTransport`] owns one UDP socket bound to the group port with
//! address reuse, joined to the group on a single interface. Every send goes
//! to the group; every receive yields one datagram from any peer on the
//! segment (our own included when multicast loop is on).

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::info;

use crate::config::MulticastConfig;
use crate::error::NetworkError;
use crate::interface::{InterfaceInfo, find_multicast_interface};

/// A fire-and-forget datagram channel shared by every peer in a group.
#[async_trait]
pub trait DatagramTransport: Send + Sync {
    /// Transmit one datagram to the whole group.
    async fn send(&self, datagram: &[u8]) -> Result<(), NetworkError>;

    /// Wait for the next datagram. Returns its length (possibly zero) and sender.
    ///
    /// Must be cancel safe: the receive loop races it against shutdown.
    async fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), NetworkError>;

    /// Local address of the underlying endpoint, if it has one.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// A UDP socket joined to an IPv4 multicast group.
pub struct MulticastTransport {
    socket: UdpSocket,
    group: SocketAddrV4,
    interface: InterfaceInfo,
}

impl MulticastTransport {
    /// Select an interface, bind the group port and join the group.
    ///
    /// Any failure is fatal for this transport: nothing is bound on error.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: &MulticastConfig) -> Result<Self, NetworkError> {
        if !config.group_addr.is_multicast() {
            return Err(NetworkError::Setup(format!(
                "{} is not a multicast address",
                config.group_addr
            )));
        }

        let interface = find_multicast_interface(config.interface.as_deref())?;
        info!(
            "Using network interface {} ({})",
            interface.name, interface.addr
        );

        let std_socket = bind_multicast_socket(config, interface.addr)
            .map_err(|e| NetworkError::Setup(format!("Join {} failed: {e}", config.socket_addr())))?;
        let socket = UdpSocket::from_std(std_socket)
            .map_err(|e| NetworkError::Setup(format!("Register socket: {e}")))?;

        info!(
            "Joined multicast group {} on {}",
            config.socket_addr(),
            interface.name
        );

        Ok(Self {
            socket,
            group: config.socket_addr(),
            interface,
        })
    }

    /// The group every datagram is sent to.
    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    /// The interface the group was joined on.
    pub fn interface(&self) -> &InterfaceInfo {
        &self.interface
    }
}

/// Build the socket: address reuse must be set before bind so several
/// processes on one host can share the group port.
fn bind_multicast_socket(
    config: &MulticastConfig,
    interface: Ipv4Addr,
) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port).into())?;
    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_loop_v4(config.multicast_loop)?;
    socket.set_multicast_ttl_v4(config.multicast_ttl)?;
    socket.join_multicast_v4(&config.group_addr, &interface)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[async_trait]
impl DatagramTransport for MulticastTransport {
    async fn send(&self, datagram: &[u8]) -> Result<(), NetworkError> {
        self.socket
            .send_to(datagram, self.group)
            .await
            .map_err(NetworkError::Send)?;
        Ok(())
    }

    async fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), NetworkError> {
        self.socket.recv_from(buf).await.map_err(NetworkError::Receive)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_rejects_unicast_group() {
        let config = MulticastConfig {
            group_addr: Ipv4Addr::new(192, 168, 1, 1),
            ..MulticastConfig::default()
        };
        match MulticastTransport::open(&config) {
            Err(NetworkError::Setup(msg)) => assert!(msg.contains("not a multicast")),
            Err(other) => panic!("Expected Setup error, got {other:?}"),
            Ok(_) => panic!("Expected Setup error, got a transport"),
        }
    }

    #[tokio::test]
    async fn test_open_unknown_interface_fails() {
        let config = MulticastConfig {
            interface: Some("no-such-interface0".to_string()),
            ..MulticastConfig::default()
        };
        assert!(matches!(
            MulticastTransport::open(&config),
            Err(NetworkError::NoInterface) | Err(NetworkError::Setup(_))
        ));
    }

    #[tokio::test]
    async fn test_open_binds_group_port() {
        let config = MulticastConfig {
            port: 0,
            ..MulticastConfig::default()
        };
        // Hosts without a multicast-capable interface cannot run this test.
        let Ok(transport) = MulticastTransport::open(&config) else {
            return;
        };

        let port = transport.local_addr().unwrap().port();
        assert_ne!(port, 0);
        assert_eq!(transport.group().ip(), &config.group_addr);
        assert!(transport.interface().is_usable());
    }

    #[tokio::test]
    async fn test_two_sockets_share_port() {
        let port = {
            let probe = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let config = MulticastConfig {
            port,
            ..MulticastConfig::default()
        };
        let Ok(first) = MulticastTransport::open(&config) else {
            return;
        };
        let second = MulticastTransport::open(&config).unwrap();

        if first.send(b"ping").await.is_err() {
            return;
        }

        let mut buf = [0u8; 16];
        let received = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            second.receive(&mut buf),
        )
        .await;
        // Loopback delivery depends on the host's multicast routing.
        if let Ok(Ok((len, _))) = received {
            assert_eq!(&buf[..len], b"ping");
        }
    }
}

//! Network interface enumeration and multicast interface selection.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::NetworkError;

/// One IPv4 address of a local network interface, with its state flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// OS interface name (e.g. `eth0`, `en0`).
    pub name: String,
    /// IPv4 address assigned to the interface.
    pub addr: Ipv4Addr,
    /// Administratively up.
    pub up: bool,
    /// Supports multicast.
    pub multicast: bool,
    /// Loopback interface.
    pub loopback: bool,
}

impl InterfaceInfo {
    /// Whether this interface can carry group traffic on the local segment.
    pub fn is_usable(&self) -> bool {
        self.up && self.multicast && !self.loopback
    }
}

/// Pick the interface to join the group on.
///
/// With `preferred` set, the first up interface with that name wins. Neither
/// the multicast flag nor the loopback flag is checked for a named interface,
/// so a configured name can select `lo` or an interface that does not report
/// multicast support. Otherwise the first usable one in enumeration order is
/// returned.
pub fn select_interface<'a>(
    candidates: &'a [InterfaceInfo],
    preferred: Option<&str>,
) -> Option<&'a InterfaceInfo> {
    match preferred {
        Some(name) => candidates.iter().find(|i| i.up && i.name == name),
        None => candidates.iter().find(|i| i.is_usable()),
    }
}

/// Enumerate the IPv4 addresses of all local interfaces.
#[cfg(unix)]
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, NetworkError> {
    use nix::net::if_::InterfaceFlags;
    use std::net::SocketAddrV4;

    let addrs = nix::ifaddrs::getifaddrs()
        .map_err(|e| NetworkError::Setup(format!("Interface enumeration failed: {e}")))?;

    let interfaces: Vec<InterfaceInfo> = addrs
        .filter_map(|ifaddr| {
            let sin = *ifaddr.address.as_ref()?.as_sockaddr_in()?;
            Some(InterfaceInfo {
                name: ifaddr.interface_name.clone(),
                addr: *SocketAddrV4::from(sin).ip(),
                up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                multicast: ifaddr.flags.contains(InterfaceFlags::IFF_MULTICAST),
                loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
            })
        })
        .collect();

    debug!("Found {} IPv4 interface addresses", interfaces.len());
    Ok(interfaces)
}

/// Always empty: enumeration is only implemented on unix, so
/// [`find_multicast_interface`] fails with [`NetworkError::NoInterface`].
#[cfg(not(unix))]
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, NetworkError> {
    debug!("Interface enumeration is not supported on this platform");
    Ok(Vec::new())
}

/// Enumerate interfaces and select one, or fail with [`NetworkError::NoInterface`].
pub fn find_multicast_interface(preferred: Option<&str>) -> Result<InterfaceInfo, NetworkError> {
    let interfaces = list_interfaces()?;
    select_interface(&interfaces, preferred)
        .cloned()
        .ok_or(NetworkError::NoInterface)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, addr: [u8; 4], up: bool, multicast: bool, loopback: bool) -> InterfaceInfo {
        InterfaceInfo {
            name: name.to_string(),
            addr: Ipv4Addr::from(addr),
            up,
            multicast,
            loopback,
        }
    }

    #[test]
    fn test_selects_first_usable() {
        let candidates = vec![
            iface("lo", [127, 0, 0, 1], true, true, true),
            iface("eth0", [10, 0, 0, 2], false, true, false),
            iface("tun0", [10, 8, 0, 1], true, false, false),
            iface("wlan0", [192, 168, 1, 20], true, true, false),
            iface("eth1", [192, 168, 2, 20], true, true, false),
        ];
        let chosen = select_interface(&candidates, None).unwrap();
        assert_eq!(chosen.name, "wlan0");
        assert_eq!(chosen.addr, Ipv4Addr::new(192, 168, 1, 20));
    }

    #[test]
    fn test_no_usable_interface() {
        let candidates = vec![
            iface("lo", [127, 0, 0, 1], true, true, true),
            iface("eth0", [10, 0, 0, 2], false, true, false),
        ];
        assert!(select_interface(&candidates, None).is_none());
        assert!(select_interface(&[], None).is_none());
    }

    #[test]
    fn test_preferred_interface_by_name() {
        let candidates = vec![
            iface("eth0", [10, 0, 0, 2], true, true, false),
            iface("lo", [127, 0, 0, 1], true, true, true),
        ];
        let chosen = select_interface(&candidates, Some("lo")).unwrap();
        assert_eq!(chosen.addr, Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_preferred_interface_skips_multicast_check() {
        let candidates = vec![
            iface("eth0", [10, 0, 0, 2], true, true, false),
            iface("tun0", [10, 8, 0, 1], true, false, false),
        ];
        let chosen = select_interface(&candidates, Some("tun0")).unwrap();
        assert!(!chosen.multicast);
        assert_eq!(chosen.addr, Ipv4Addr::new(10, 8, 0, 1));
    }

    #[test]
    fn test_preferred_interface_must_be_up() {
        let candidates = vec![iface("eth0", [10, 0, 0, 2], false, true, false)];
        assert!(select_interface(&candidates, Some("eth0")).is_none());
        assert!(select_interface(&candidates, Some("eth9")).is_none());
    }

    #[test]
    fn test_is_usable() {
        assert!(iface("eth0", [10, 0, 0, 2], true, true, false).is_usable());
        assert!(!iface("lo", [127, 0, 0, 1], true, true, true).is_usable());
    }

    #[cfg(not(unix))]
    #[test]
    fn test_no_interfaces_without_unix() {
        assert!(list_interfaces().unwrap().is_empty());
        assert!(matches!(
            find_multicast_interface(None),
            Err(NetworkError::NoInterface)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_interfaces_have_names() {
        let interfaces = list_interfaces().unwrap();
        for interface in &interfaces {
            assert!(!interface.name.is_empty());
        }
    }
}

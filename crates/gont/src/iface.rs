//! Interface model.

use std::fmt;
use std::net::IpAddr;

/// A network interface belonging to one node.
///
/// Starts out as declared state assembled by interface-capable options;
/// after link realization it describes a live veth endpoint or bridge
/// port inside the owning node's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name, unique within its node.
    pub name: String,
    /// Name of the owning node, filled in when the interface is attached.
    pub node: String,
    /// Ordered address/prefix pairs assigned at bring-up.
    pub addresses: Vec<(IpAddr, u8)>,
    /// MTU applied at bring-up, if declared.
    pub mtu: Option<u32>,
}

impl Interface {
    /// Declare an interface with the given name and no addresses yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: String::new(),
            addresses: Vec::new(),
            mtu: None,
        }
    }

    /// First IPv4 address if one is declared, else the first address.
    ///
    /// Probe targets prefer IPv4 so mixed v4/v6 topologies ping the
    /// family most likely to be routed.
    #[must_use]
    pub fn probe_address(&self) -> Option<IpAddr> {
        self.addresses
            .iter()
            .map(|(addr, _)| *addr)
            .find(IpAddr::is_ipv4)
            .or_else(|| self.addresses.first().map(|(addr, _)| *addr))
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn probe_address_prefers_ipv4() {
        let mut iface = Interface::new("veth0");
        iface
            .addresses
            .push((IpAddr::V6(Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 1)), 64));
        iface
            .addresses
            .push((IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 24));

        assert_eq!(
            iface.probe_address(),
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)))
        );
    }

    #[test]
    fn probe_address_none_without_addresses() {
        assert_eq!(Interface::new("veth0").probe_address(), None);
    }
}

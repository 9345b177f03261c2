//! Polymorphic topology options.
//!
//! One option list configures many target kinds: every construction site
//! (network, node, interface, bridge) walks the list, applies the options
//! carrying its capability, and silently skips the rest. An option opts
//! into a capability by overriding the matching accessor of
//! [`TopologyOption`], so dispatch is plain trait calls with no
//! per-option tables and no downcasting.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use gont_common::{GontError, GontResult};

use crate::iface::Interface;

/// A configuration value applicable to compatible construction targets.
///
/// Implementations override the accessors for the targets they support;
/// the defaults advertise no capability at all.
pub trait TopologyOption: fmt::Debug + Send + Sync {
    /// This option configures the network aggregate.
    fn as_network(&self) -> Option<&dyn NetworkOption> {
        None
    }

    /// This option configures a node under construction.
    fn as_node(&self) -> Option<&dyn NodeOption> {
        None
    }

    /// This option configures an interface declaration.
    fn as_interface(&self) -> Option<&dyn InterfaceOption> {
        None
    }

    /// This option configures a switch bridge.
    fn as_bridge(&self) -> Option<&dyn BridgeOption> {
        None
    }
}

/// Network-targeted capability.
pub trait NetworkOption: fmt::Debug + Send + Sync {
    /// Mutate the network configuration.
    fn apply(&self, config: &mut NetworkConfig);
}

/// Node-targeted capability.
pub trait NodeOption: fmt::Debug + Send + Sync {
    /// Mutate the declared configuration of a node under construction.
    fn apply(&self, config: &mut NodeConfig);
}

/// Interface-targeted capability.
pub trait InterfaceOption: fmt::Debug + Send + Sync {
    /// Mutate an interface declaration.
    fn apply(&self, interface: &mut Interface);
}

/// Bridge-targeted capability.
pub trait BridgeOption: fmt::Debug + Send + Sync {
    /// Mutate a switch's bridge configuration.
    fn apply(&self, bridge: &mut BridgeConfig);
}

/// Network-level state assembled from options.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Leave the topology running past process exit.
    pub persistent: bool,
    /// Options prepended to every subsequent node addition.
    pub default_options: Vec<Arc<dyn TopologyOption>>,
}

/// Declared per-node state assembled from options, consumed when the
/// node's interfaces and routes are realized.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Interfaces to wire up at construction.
    pub interfaces: Vec<Iface>,
    /// Static routes installed in the node's namespace.
    pub routes: Vec<Route>,
    /// Packet-filter rules attached to the node's chain.
    pub filters: Vec<FilterRule>,
}

/// Bridge device state assembled from options.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// MTU applied to the bridge device, if declared.
    pub mtu: Option<u32>,
}

/// A static route: destination network plus gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network address.
    pub dest: IpAddr,
    /// Destination prefix length.
    pub prefix: u8,
    /// Next hop.
    pub gateway: IpAddr,
}

/// Packet-filter hook points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Traffic addressed to the node itself.
    Input,
    /// Traffic originated by the node.
    Output,
    /// Traffic routed through the node.
    Forward,
    /// Before the routing decision.
    Prerouting,
    /// After the routing decision.
    Postrouting,
}

impl Hook {
    /// Kernel hook name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Forward => "forward",
            Self::Prerouting => "prerouting",
            Self::Postrouting => "postrouting",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque packet-filter rule produced by an external rule builder and
/// attached to a node's filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    /// Hook the rule attaches to.
    pub hook: Hook,
    /// Ordered match/action expressions, uninterpreted here.
    pub expressions: Vec<String>,
}

// Engine helpers. Options apply in list order; non-matching options are
// skipped.

pub(crate) fn apply_network(options: &[&dyn TopologyOption], config: &mut NetworkConfig) {
    for option in options {
        if let Some(o) = option.as_network() {
            o.apply(config);
        }
    }
}

pub(crate) fn apply_node(options: &[&dyn TopologyOption], config: &mut NodeConfig) {
    for option in options {
        if let Some(o) = option.as_node() {
            o.apply(config);
        }
    }
}

pub(crate) fn apply_interface(options: &[&dyn TopologyOption], interface: &mut Interface) {
    for option in options {
        if let Some(o) = option.as_interface() {
            o.apply(interface);
        }
    }
}

pub(crate) fn apply_bridge(options: &[&dyn TopologyOption], config: &mut BridgeConfig) {
    for option in options {
        if let Some(o) = option.as_bridge() {
            o.apply(config);
        }
    }
}

/// An address/prefix pair for an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    /// The interface address.
    pub addr: IpAddr,
    /// Prefix length.
    pub prefix: u8,
}

impl TopologyOption for Address {
    fn as_interface(&self) -> Option<&dyn InterfaceOption> {
        Some(self)
    }
}

impl InterfaceOption for Address {
    fn apply(&self, interface: &mut Interface) {
        interface.addresses.push((self.addr, self.prefix));
    }
}

/// IPv4 interface address.
#[must_use]
pub fn ipv4(a: u8, b: u8, c: u8, d: u8, prefix: u8) -> Address {
    Address {
        addr: IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
        prefix,
    }
}

/// IPv6 interface address.
#[must_use]
pub fn ipv6(addr: Ipv6Addr, prefix: u8) -> Address {
    Address {
        addr: IpAddr::V6(addr),
        prefix,
    }
}

/// Parse an interface address in CIDR notation.
///
/// # Errors
///
/// Returns [`GontError::InvalidAddress`] for malformed input or a prefix
/// exceeding the address family's width.
pub fn addr(cidr: &str) -> GontResult<Address> {
    let invalid = || GontError::InvalidAddress {
        value: cidr.to_string(),
    };

    let (ip, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = ip.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;

    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(invalid());
    }
    Ok(Address { addr, prefix })
}

/// A default route through the given gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gateway {
    /// Next hop for the default route.
    pub addr: IpAddr,
}

impl TopologyOption for Gateway {
    fn as_node(&self) -> Option<&dyn NodeOption> {
        Some(self)
    }
}

impl NodeOption for Gateway {
    fn apply(&self, config: &mut NodeConfig) {
        let dest = match self.addr {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        config.routes.push(Route {
            dest,
            prefix: 0,
            gateway: self.addr,
        });
    }
}

/// Default gateway from an address.
#[must_use]
pub fn gateway(addr: IpAddr) -> Gateway {
    Gateway { addr }
}

/// Default IPv4 gateway.
#[must_use]
pub fn gateway_v4(a: u8, b: u8, c: u8, d: u8) -> Gateway {
    Gateway {
        addr: IpAddr::V4(Ipv4Addr::new(a, b, c, d)),
    }
}

/// A static route declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute(Route);

impl TopologyOption for StaticRoute {
    fn as_node(&self) -> Option<&dyn NodeOption> {
        Some(self)
    }
}

impl NodeOption for StaticRoute {
    fn apply(&self, config: &mut NodeConfig) {
        config.routes.push(self.0.clone());
    }
}

/// Static route to `dest/prefix` via `gw`.
#[must_use]
pub fn route(dest: IpAddr, prefix: u8, gw: IpAddr) -> StaticRoute {
    StaticRoute(Route {
        dest,
        prefix,
        gateway: gw,
    })
}

/// Declare an interface on the node under construction, wired to an
/// existing peer node (usually a switch).
///
/// Nested interface-capable options (addresses, MTU) are applied to the
/// declaration when it is built.
#[derive(Debug, Clone)]
pub struct Iface {
    /// The peer node this interface connects to.
    pub peer: String,
    /// The declared interface.
    pub interface: Interface,
}

impl TopologyOption for Iface {
    fn as_node(&self) -> Option<&dyn NodeOption> {
        Some(self)
    }
}

impl NodeOption for Iface {
    fn apply(&self, config: &mut NodeConfig) {
        config.interfaces.push(self.clone());
    }
}

/// Interface declaration connecting the node under construction to
/// `peer`.
#[must_use]
pub fn iface(name: &str, peer: &str, options: &[&dyn TopologyOption]) -> Iface {
    let mut interface = Interface::new(name);
    apply_interface(options, &mut interface);
    Iface {
        peer: peer.to_string(),
        interface,
    }
}

/// MTU for an interface or a switch bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mtu(pub u32);

impl TopologyOption for Mtu {
    fn as_interface(&self) -> Option<&dyn InterfaceOption> {
        Some(self)
    }

    fn as_bridge(&self) -> Option<&dyn BridgeOption> {
        Some(self)
    }
}

impl InterfaceOption for Mtu {
    fn apply(&self, interface: &mut Interface) {
        interface.mtu = Some(self.0);
    }
}

impl BridgeOption for Mtu {
    fn apply(&self, config: &mut BridgeConfig) {
        config.mtu = Some(self.0);
    }
}

/// MTU declaration.
#[must_use]
pub fn mtu(value: u32) -> Mtu {
    Mtu(value)
}

/// Keep the topology alive past process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persistent(pub bool);

impl TopologyOption for Persistent {
    fn as_network(&self) -> Option<&dyn NetworkOption> {
        Some(self)
    }
}

impl NetworkOption for Persistent {
    fn apply(&self, config: &mut NetworkConfig) {
        config.persistent = self.0;
    }
}

/// Persistence declaration.
#[must_use]
pub fn persistent(value: bool) -> Persistent {
    Persistent(value)
}

/// Options applied to every node added after network construction.
#[derive(Debug, Clone)]
pub struct DefaultOptions(pub Vec<Arc<dyn TopologyOption>>);

impl TopologyOption for DefaultOptions {
    fn as_network(&self) -> Option<&dyn NetworkOption> {
        Some(self)
    }
}

impl NetworkOption for DefaultOptions {
    fn apply(&self, config: &mut NetworkConfig) {
        config.default_options = self.0.clone();
    }
}

/// Default node options for the network.
#[must_use]
pub fn defaults(options: Vec<Arc<dyn TopologyOption>>) -> DefaultOptions {
    DefaultOptions(options)
}

/// Attach an externally-built packet-filter rule to the node.
#[derive(Debug, Clone)]
pub struct Filter(pub FilterRule);

impl TopologyOption for Filter {
    fn as_node(&self) -> Option<&dyn NodeOption> {
        Some(self)
    }
}

impl NodeOption for Filter {
    fn apply(&self, config: &mut NodeConfig) {
        config.filters.push(self.0.clone());
    }
}

/// Filter rule for the given hook.
#[must_use]
pub fn filter(hook: Hook, expressions: &[&str]) -> Filter {
    Filter(FilterRule {
        hook,
        expressions: expressions.iter().map(ToString::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_list_applies_per_target() {
        let keep = Persistent(true);
        let size = Mtu(1400);
        let via = Gateway {
            addr: IpAddr::V4(Ipv4Addr::new(10, 0, 1, 1)),
        };
        let options: Vec<&dyn TopologyOption> = vec![&keep, &size, &via];

        let mut network = NetworkConfig::default();
        apply_network(&options, &mut network);
        assert!(network.persistent);
        assert!(network.default_options.is_empty());

        let mut node = NodeConfig::default();
        apply_node(&options, &mut node);
        assert_eq!(node.routes.len(), 1);
        assert_eq!(node.routes[0].prefix, 0);
        assert!(node.interfaces.is_empty());

        let mut bridge = BridgeConfig::default();
        apply_bridge(&options, &mut bridge);
        assert_eq!(bridge.mtu, Some(1400));
    }

    #[test]
    fn interface_declaration_collects_nested_options() {
        let declared = iface("veth0", "sw", &[&ipv4(10, 0, 0, 1, 24), &mtu(9000)]);
        assert_eq!(declared.peer, "sw");
        assert_eq!(declared.interface.name, "veth0");
        assert_eq!(
            declared.interface.addresses,
            vec![(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 24)]
        );
        assert_eq!(declared.interface.mtu, Some(9000));
    }

    #[test]
    fn list_order_is_preserved() {
        let small = Mtu(1400);
        let jumbo = Mtu(9000);
        let options: Vec<&dyn TopologyOption> = vec![&small, &jumbo];
        let mut interface = Interface::new("veth0");
        apply_interface(&options, &mut interface);
        assert_eq!(interface.mtu, Some(9000));
    }

    #[test]
    fn addr_parses_cidr() {
        let a = addr("10.0.0.1/24").unwrap();
        assert_eq!(a.addr, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(a.prefix, 24);

        let a6 = addr("fc00::1/64").unwrap();
        assert!(a6.addr.is_ipv6());

        assert!(addr("10.0.0.1").is_err());
        assert!(addr("10.0.0.1/33").is_err());
        assert!(addr("fc00::1/129").is_err());
        assert!(addr("not-an-ip/8").is_err());
    }

    #[test]
    fn gateway_family_selects_default_destination() {
        let mut node = NodeConfig::default();
        let g6 = Gateway {
            addr: "fc00::1".parse().unwrap(),
        };
        NodeOption::apply(&g6, &mut node);
        assert_eq!(node.routes[0].dest, IpAddr::V6(Ipv6Addr::UNSPECIFIED));
    }

    #[test]
    fn default_options_replace_not_append() {
        let mut network = NetworkConfig::default();
        let first = defaults(vec![Arc::new(Mtu(1400))]);
        let second = defaults(vec![Arc::new(Mtu(9000)), Arc::new(Persistent(true))]);
        NetworkOption::apply(&first, &mut network);
        NetworkOption::apply(&second, &mut network);
        assert_eq!(network.default_options.len(), 2);
    }

    #[test]
    fn filter_rules_append_in_order() {
        let mut node = NodeConfig::default();
        let drop_input = filter(Hook::Input, &["drop"]);
        let allow_forward = filter(Hook::Forward, &["accept"]);
        let options: Vec<&dyn TopologyOption> = vec![&drop_input, &allow_forward];
        apply_node(&options, &mut node);
        assert_eq!(node.filters.len(), 2);
        assert_eq!(node.filters[0].hook, Hook::Input);
        assert_eq!(node.filters[1].hook.as_str(), "forward");
    }
}

//! Veth link realization.
//!
//! A link has no identity of its own: realizing one leaves behind two
//! live interfaces joined by a virtual channel. The pair is created in
//! the control namespace under ephemeral names, then each end is renamed
//! to its declared name and moved into its owner's namespace in a single
//! netlink request. Failure halfway through is propagated as-is; the
//! recovery path is a full network teardown, the topology being
//! disposable by construction.

use std::net::IpAddr;
use std::os::fd::RawFd;

use futures::TryStreamExt;
use gont_common::{GontError, GontResult, names};
use rand::Rng;
use rtnetlink::{Handle, LinkUnspec, LinkVeth, RouteMessageBuilder};

use crate::iface::Interface;
use crate::options::{self, Route, TopologyOption};

/// One endpoint of a link under construction.
///
/// Carries the declared interface (name, addresses, MTU) plus any routes
/// declared alongside it; network- and bridge-level options in the list
/// are skipped.
#[derive(Debug, Clone)]
pub struct LinkEnd {
    /// Name of the node owning this end.
    pub node: String,
    /// The interface realized on this end.
    pub interface: Interface,
    /// Routes installed in the owning node once the end is up.
    pub routes: Vec<Route>,
}

impl LinkEnd {
    /// Declare a link endpoint on `node` with interface `ifname`.
    ///
    /// # Errors
    ///
    /// Returns [`GontError::InvalidName`] if `ifname` does not fit in an
    /// interface name.
    pub fn new(node: &str, ifname: &str, options: &[&dyn TopologyOption]) -> GontResult<Self> {
        names::validate_ifname(ifname)?;

        let mut interface = Interface::new(ifname);
        options::apply_interface(options, &mut interface);

        let mut config = options::NodeConfig::default();
        options::apply_node(options, &mut config);

        Ok(Self {
            node: node.to_string(),
            interface,
            routes: config.routes,
        })
    }
}

/// Declare a link endpoint; see [`LinkEnd::new`].
///
/// # Errors
///
/// Returns [`GontError::InvalidName`] for an unusable interface name.
pub fn end(node: &str, ifname: &str, options: &[&dyn TopologyOption]) -> GontResult<LinkEnd> {
    LinkEnd::new(node, ifname, options)
}

/// Collision-free ephemeral names for the two ends of a fresh veth pair.
///
/// The names only exist in the control namespace between pair creation
/// and the move into the owner namespaces.
pub(crate) fn ephemeral_names() -> (String, String) {
    let tag: u32 = rand::thread_rng().gen_range(0..=0xffff_ffff);
    (format!("gve{tag:08x}a"), format!("gve{tag:08x}b"))
}

/// Kernel link index for `name` in the namespace `handle` is bound to.
pub(crate) async fn link_index(handle: &Handle, name: &str) -> GontResult<u32> {
    let mut links = handle.link().get().match_name(name.to_string()).execute();
    let link = links
        .try_next()
        .await
        .map_err(|e| GontError::netlink(format!("find link {name}"), e))?
        .ok_or_else(|| GontError::Internal {
            message: format!("No link named {name}"),
        })?;
    Ok(link.header.index)
}

/// Create a veth pair in the namespace `handle` is bound to.
pub(crate) async fn create_veth_pair(handle: &Handle, a: &str, b: &str) -> GontResult<()> {
    tracing::debug!(a, b, "Creating veth pair");
    handle
        .link()
        .add(LinkVeth::new(a, b).build())
        .execute()
        .await
        .map_err(|e| GontError::netlink(format!("add veth pair {a}/{b}"), e))
}

/// Remove leftover ephemeral pair ends after a failed realization.
///
/// Deleting either surviving end takes the whole pair with it; names
/// already moved out of the control namespace are simply gone. Failures
/// here are logged and swallowed, the realization error being the one
/// worth reporting.
pub(crate) async fn discard_ephemerals(control: &Handle, names: &[&str]) {
    for name in names {
        let Ok(index) = link_index(control, name).await else {
            continue;
        };
        if let Err(e) = control.link().del(index).execute().await {
            tracing::warn!(link = *name, error = %e, "Leaking ephemeral link");
        }
    }
}

/// Rename one pair end to its declared name and move it into the owner's
/// namespace, in a single request.
pub(crate) async fn move_and_rename(
    control: &Handle,
    ephemeral: &str,
    name: &str,
    ns_fd: RawFd,
) -> GontResult<()> {
    let index = link_index(control, ephemeral).await?;
    control
        .link()
        .set(
            LinkUnspec::new_with_index(index)
                .name(name.to_string())
                .setns_by_fd(ns_fd)
                .build(),
        )
        .execute()
        .await
        .map_err(|e| GontError::netlink(format!("move link {name} into namespace"), e))
}

/// Bring an interface up inside its owner's namespace and assign its
/// declared addresses.
pub(crate) async fn configure(handle: &Handle, interface: &Interface) -> GontResult<()> {
    let name = &interface.name;

    let mut builder = LinkUnspec::new_with_name(name).up();
    if let Some(mtu) = interface.mtu {
        builder = builder.mtu(mtu);
    }
    handle
        .link()
        .set(builder.build())
        .execute()
        .await
        .map_err(|e| GontError::netlink(format!("bring link {name} up"), e))?;

    if interface.addresses.is_empty() {
        return Ok(());
    }

    let index = link_index(handle, name).await?;
    for (addr, prefix) in &interface.addresses {
        tracing::debug!(%addr, prefix, dev = %name, "Assigning address");
        handle
            .address()
            .add(index, *addr, *prefix)
            .execute()
            .await
            .map_err(|e| GontError::netlink(format!("add address {addr}/{prefix} to {name}"), e))?;
    }

    Ok(())
}

/// Install one route in the namespace `handle` is bound to.
///
/// # Errors
///
/// Returns [`GontError::InvalidAddress`] when destination and gateway
/// belong to different address families.
pub(crate) async fn install_route(handle: &Handle, route: &Route) -> GontResult<()> {
    tracing::debug!(dest = %route.dest, prefix = route.prefix, gateway = %route.gateway, "Adding route");

    let request = match (route.dest, route.gateway) {
        (IpAddr::V4(dest), IpAddr::V4(gateway)) => handle.route().add(
            RouteMessageBuilder::<std::net::Ipv4Addr>::new()
                .destination_prefix(dest, route.prefix)
                .gateway(gateway)
                .build(),
        ),
        (IpAddr::V6(dest), IpAddr::V6(gateway)) => handle.route().add(
            RouteMessageBuilder::<std::net::Ipv6Addr>::new()
                .destination_prefix(dest, route.prefix)
                .gateway(gateway)
                .build(),
        ),
        _ => {
            return Err(GontError::InvalidAddress {
                value: format!("{}/{} via {}", route.dest, route.prefix, route.gateway),
            });
        }
    };

    request
        .execute()
        .await
        .map_err(|e| GontError::netlink(format!("add route to {}/{}", route.dest, route.prefix), e))
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::options::{gateway_v4, ipv4, mtu};

    #[test]
    fn end_collects_interface_and_route_options() {
        let gw = gateway_v4(10, 0, 0, 1);
        let addr = ipv4(10, 0, 0, 2, 24);
        let jumbo = mtu(9000);
        let end = LinkEnd::new("h1", "veth0", &[&addr, &jumbo, &gw]).unwrap();

        assert_eq!(end.node, "h1");
        assert_eq!(end.interface.name, "veth0");
        assert_eq!(
            end.interface.addresses,
            vec![(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 24)]
        );
        assert_eq!(end.interface.mtu, Some(9000));
        assert_eq!(end.routes.len(), 1);
        assert_eq!(end.routes[0].gateway, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn end_rejects_overlong_interface_names() {
        assert!(LinkEnd::new("h1", "a-much-too-long-name", &[]).is_err());
    }

    #[test]
    fn ephemeral_names_fit_and_differ() {
        let (a, b) = ephemeral_names();
        assert_ne!(a, b);
        assert!(a.len() <= gont_common::names::MAX_IFNAME_LEN);
        assert!(b.len() <= gont_common::names::MAX_IFNAME_LEN);
    }
}

//! Topology nodes.
//!
//! A node is one participant in the topology: a name, an exclusively
//! owned network namespace, a netlink channel bound to that namespace,
//! and an ordered interface list. The three variants share [`BaseNode`]:
//! a [`Host`] is the plain form, a [`Switch`] additionally owns a kernel
//! bridge, and a [`Router`] is a host with forwarding enabled at
//! construction.
//!
//! Lifecycle is one-directional: unconfigured (namespace allocated),
//! configured (interfaces, routes, and filters applied), torn down.

use std::fmt;

use gont_common::{GontError, GontResult, names};
use rtnetlink::LinkUnspec;
use tokio::task::JoinHandle;

use crate::iface::Interface;
use crate::link;
use crate::namespace::Namespace;
use crate::options::{FilterRule, Route};

mod host;
mod router;
mod switch;

pub use host::Host;
pub use router::Router;
pub use switch::{BRIDGE_NAME, Switch};

const LOOPBACK: &str = "lo";

/// State shared by every node variant.
pub struct BaseNode {
    name: String,
    network: String,
    namespace: Namespace,
    handle: rtnetlink::Handle,
    netlink_task: JoinHandle<()>,
    interfaces: Vec<Interface>,
    routes: Vec<Route>,
    filters: Vec<FilterRule>,
}

impl BaseNode {
    /// Allocate the namespace and netlink channel for a new node.
    ///
    /// The namespace is named `gont-<network>-<node>` so teardown can
    /// rediscover it from persisted state alone. Loopback is brought up
    /// immediately. On any failure the fresh namespace is removed again;
    /// a node that never registers must not leak kernel state.
    pub(crate) async fn new(network: &str, name: &str) -> GontResult<Self> {
        names::validate_name(name)?;

        let namespace = Namespace::create(&format!("gont-{network}-{name}"))?;
        let (netlink_task, handle) = match namespace.netlink() {
            Ok(channel) => channel,
            Err(e) => {
                best_effort_delete(&namespace);
                return Err(e);
            }
        };

        let base = Self {
            name: name.to_string(),
            network: network.to_string(),
            namespace,
            handle,
            netlink_task,
            interfaces: Vec::new(),
            routes: Vec::new(),
            filters: Vec::new(),
        };

        if let Err(e) = base.set_link_up(LOOPBACK).await {
            base.discard();
            return Err(e);
        }

        tracing::debug!(node = name, network, "Allocated node namespace");
        Ok(base)
    }

    /// Bind a pseudo-node to the caller's current namespace.
    ///
    /// Used for the network's control node; the namespace is not owned
    /// and survives teardown.
    pub(crate) fn control(network: &str) -> GontResult<Self> {
        let namespace = Namespace::current()?;
        let (netlink_task, handle) = namespace.netlink()?;

        Ok(Self {
            name: "host".to_string(),
            network: network.to_string(),
            namespace,
            handle,
            netlink_task,
            interfaces: Vec::new(),
            routes: Vec::new(),
            filters: Vec::new(),
        })
    }

    /// The node's name, unique within its network.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning network.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// The node's namespace handle.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Interfaces in attachment order.
    #[must_use]
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Routes installed in the node's routing table.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Filter rules attached to the node's chain.
    #[must_use]
    pub fn filters(&self) -> &[FilterRule] {
        &self.filters
    }

    pub(crate) fn handle(&self) -> &rtnetlink::Handle {
        &self.handle
    }

    /// Record a realized interface, enforcing per-node name uniqueness.
    pub(crate) fn adopt_interface(&mut self, mut interface: Interface) -> GontResult<()> {
        if self.interfaces.iter().any(|i| i.name == interface.name) {
            return Err(GontError::InterfaceExists {
                node: self.name.clone(),
                interface: interface.name,
            });
        }
        interface.node.clone_from(&self.name);
        self.interfaces.push(interface);
        Ok(())
    }

    /// Install routes in the namespace and record them.
    pub(crate) async fn install_routes(&mut self, routes: Vec<Route>) -> GontResult<()> {
        for route in &routes {
            link::install_route(&self.handle, route).await?;
        }
        self.routes.extend(routes);
        Ok(())
    }

    pub(crate) fn attach_filters(&mut self, rules: Vec<FilterRule>) {
        self.filters.extend(rules);
    }

    pub(crate) async fn set_link_up(&self, name: &str) -> GontResult<()> {
        self.handle
            .link()
            .set(LinkUnspec::new_with_name(name).up().build())
            .execute()
            .await
            .map_err(|e| GontError::netlink(format!("bring {name} up in node {}", self.name), e))
    }

    /// Release the node's kernel resources.
    ///
    /// An already-deleted namespace counts as success: prior partial
    /// cleanup may have removed it.
    pub(crate) fn teardown(&self) -> GontResult<()> {
        self.netlink_task.abort();
        self.namespace.delete()?;
        tracing::debug!(node = %self.name, network = %self.network, "Node torn down");
        Ok(())
    }

    /// Drop a half-built node, keeping whatever state can be reclaimed.
    pub(crate) fn discard(&self) {
        self.netlink_task.abort();
        best_effort_delete(&self.namespace);
    }
}

fn best_effort_delete(namespace: &Namespace) {
    if let Err(e) = namespace.delete() {
        tracing::warn!(namespace = namespace.name(), error = %e, "Leaking namespace of failed node");
    }
}

impl fmt::Debug for BaseNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseNode")
            .field("name", &self.name)
            .field("network", &self.network)
            .field("namespace", &self.namespace)
            .field("interfaces", &self.interfaces)
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

/// A registered topology node.
#[derive(Debug)]
pub enum Node {
    /// Plain namespace with veth endpoints.
    Host(Host),
    /// Namespace owning a kernel bridge.
    Switch(Switch),
    /// Host with packet forwarding enabled.
    Router(Router),
}

impl Node {
    /// Shared node state.
    #[must_use]
    pub fn base(&self) -> &BaseNode {
        match self {
            Self::Host(h) => h.base(),
            Self::Switch(s) => s.base(),
            Self::Router(r) => r.base(),
        }
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseNode {
        match self {
            Self::Host(h) => h.base_mut(),
            Self::Switch(s) => s.base_mut(),
            Self::Router(r) => r.base_mut(),
        }
    }

    /// The node's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.base().name()
    }

    /// The host view of this node, if it has one.
    ///
    /// Hosts and routers resolve; switches do not appear in the hosts
    /// file and carry no addresses of their own.
    #[must_use]
    pub fn as_host(&self) -> Option<&Host> {
        match self {
            Self::Host(h) => Some(h),
            Self::Router(r) => Some(r.host()),
            Self::Switch(_) => None,
        }
    }

    /// The switch view of this node, if it is one.
    #[must_use]
    pub fn as_switch(&self) -> Option<&Switch> {
        match self {
            Self::Switch(s) => Some(s),
            _ => None,
        }
    }
}

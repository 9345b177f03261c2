//! The network aggregate.
//!
//! A [`Network`] owns every node of one topology, the pinned control
//! pseudo-node bound to the caller's namespace, and the persisted state
//! tree under the runtime root. All topology mutation goes through it:
//! node additions, link realization, hosts-file regeneration, teardown.
//!
//! The aggregate provides no internal locking; a single network must be
//! mutated from one execution context at a time. Dropping a
//! non-persistent network without calling [`Network::close`] or
//! [`Network::teardown`] leaks its state, recoverable later via
//! [`cleanup_network`](crate::registry::cleanup_network) with only the
//! network's name.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gont_common::paths::NetworkPaths;
use gont_common::{GontError, GontResult, names};

use crate::hosts::{self, HostsEntry};
use crate::iface::Interface;
use crate::link::{self, LinkEnd};
use crate::namespace::NETNS_DIR;
use crate::node::{BaseNode, Host, Node, Router, Switch};
use crate::options::{self, Iface, NodeConfig, Route, TopologyOption};
use crate::{caps, probe, registry};

/// A single-host virtual network under construction or in use.
#[derive(Debug)]
pub struct Network {
    name: String,
    paths: NetworkPaths,
    nodes: BTreeMap<String, Node>,
    host_node: Host,
    persistent: bool,
    default_options: Vec<Arc<dyn TopologyOption>>,
}

impl Network {
    /// Create a network with the given name, or a generated one if the
    /// name is empty.
    ///
    /// Allocates the on-disk skeleton, applies network-targeted options,
    /// pins the control pseudo-node to the caller's current namespace,
    /// and writes the initial hosts file.
    ///
    /// # Errors
    ///
    /// Fails with [`GontError::PrivilegeRequired`] without
    /// `CAP_NET_ADMIN` and with [`GontError::NetworkExists`] if the state
    /// directory for the name already exists. The existence check is the
    /// only cross-process exclusion: two processes racing on one explicit
    /// name can both pass it, which generated names make unlikely.
    pub async fn new(name: &str, options: &[&dyn TopologyOption]) -> GontResult<Self> {
        caps::check_caps()?;

        let name = if name.is_empty() {
            registry::generate_network_name()
        } else {
            name.to_string()
        };
        names::validate_name(&name)?;

        let paths = NetworkPaths::new(&name);
        if paths.base.exists() {
            return Err(GontError::NetworkExists { name });
        }

        let mut config = options::NetworkConfig::default();
        options::apply_network(options, &mut config);

        paths.create_skeleton()?;

        let host_node = Host::from_base(BaseNode::control(&name)?);

        let network = Self {
            name,
            paths,
            nodes: BTreeMap::new(),
            host_node,
            persistent: config.persistent,
            default_options: config.default_options,
        };
        network.update_hosts_file()?;

        tracing::info!(network = %network.name, persistent = network.persistent, "Created network");
        Ok(network)
    }

    /// The network's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base directory of the persisted state tree.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.paths.base
    }

    /// Whether the topology survives [`Network::close`].
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// The control pseudo-node pinned to the caller's namespace.
    #[must_use]
    pub fn host_node(&self) -> &Host {
        &self.host_node
    }

    /// Registered node names, sorted.
    #[must_use]
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    /// Look up any node by name.
    ///
    /// # Errors
    ///
    /// Returns [`GontError::NodeNotFound`] for an unknown name.
    pub fn node(&self, name: &str) -> GontResult<&Node> {
        self.nodes.get(name).ok_or_else(|| GontError::NodeNotFound {
            name: name.to_string(),
        })
    }

    /// Look up a host by name.
    ///
    /// # Errors
    ///
    /// Returns [`GontError::NodeNotFound`] unless a host is registered
    /// under this name.
    pub fn host(&self, name: &str) -> GontResult<&Host> {
        match self.node(name)? {
            Node::Host(h) => Ok(h),
            _ => Err(GontError::NodeNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Look up a switch by name.
    ///
    /// # Errors
    ///
    /// Returns [`GontError::NodeNotFound`] unless a switch is registered
    /// under this name.
    pub fn switch(&self, name: &str) -> GontResult<&Switch> {
        match self.node(name)? {
            Node::Switch(s) => Ok(s),
            _ => Err(GontError::NodeNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Look up a router by name.
    ///
    /// # Errors
    ///
    /// Returns [`GontError::NodeNotFound`] unless a router is registered
    /// under this name.
    pub fn router(&self, name: &str) -> GontResult<&Router> {
        match self.node(name)? {
            Node::Router(r) => Ok(r),
            _ => Err(GontError::NodeNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Add a host node.
    ///
    /// Node-capable options in the list are applied; others are skipped.
    /// The shared hosts file is regenerated synchronously so nodes added
    /// later resolve this one.
    ///
    /// # Errors
    ///
    /// Fails on a name collision, namespace allocation failure, or any
    /// kernel operation while realizing declared interfaces. A failed
    /// addition leaves no registry entry behind.
    pub async fn add_host(&mut self, name: &str, options: &[&dyn TopologyOption]) -> GontResult<()> {
        let (base, config) = self.allocate(name, options).await?;
        tracing::info!(network = %self.name, host = name, "Adding host");
        self.commit(Node::Host(Host::from_base(base)), config).await
    }

    /// Add a switch node owning a kernel bridge.
    ///
    /// Bridge-capable options, network defaults first, configure the
    /// bridge device; interfaces
    /// declared in the option list are wired to their peers and enslaved
    /// once the bridge is up.
    ///
    /// # Errors
    ///
    /// As [`Network::add_host`], plus bridge creation failures.
    pub async fn add_switch(
        &mut self,
        name: &str,
        options: &[&dyn TopologyOption],
    ) -> GontResult<()> {
        let (base, config) = self.allocate(name, options).await?;
        tracing::info!(network = %self.name, switch = name, "Adding switch");

        let mut bridge = options::BridgeConfig::default();
        options::apply_bridge(&self.default_option_refs(), &mut bridge);
        options::apply_bridge(options, &mut bridge);

        let switch = Switch::new(base, bridge).await?;
        self.commit(Node::Switch(switch), config).await
    }

    /// Add a router: a host with forwarding enabled at construction.
    ///
    /// Construction order is strict: the underlying host is built
    /// unregistered, forwarding is enabled, then the router is wrapped
    /// and registered. A forwarding failure leaves no half-configured
    /// router behind.
    ///
    /// # Errors
    ///
    /// As [`Network::add_host`], plus forwarding-enable failures.
    pub async fn add_router(
        &mut self,
        name: &str,
        options: &[&dyn TopologyOption],
    ) -> GontResult<()> {
        let (base, config) = self.allocate(name, options).await?;
        tracing::info!(network = %self.name, router = name, "Adding router");

        let router = Router::new(Host::from_base(base)).await?;
        self.commit(Node::Router(router), config).await
    }

    /// Realize a point-to-point link between two registered nodes.
    ///
    /// A veth pair is created in the control namespace under ephemeral
    /// names; each end is then renamed and moved into its owner, brought
    /// up, and either addressed (hosts, routers) or enslaved into the
    /// bridge (switches). On failure, pair ends still sitting in the
    /// control namespace are deleted again; teardown could never find
    /// them there. Ends already moved into a node are reclaimed by
    /// [`Network::teardown`] with that node's namespace.
    ///
    /// # Errors
    ///
    /// Fails on unknown nodes, interface-name collisions, or any kernel
    /// operation.
    pub async fn add_link(&mut self, left: LinkEnd, right: LinkEnd) -> GontResult<()> {
        for end in [&left, &right] {
            if !self.nodes.contains_key(&end.node) {
                return Err(GontError::NodeNotFound {
                    name: end.node.clone(),
                });
            }
        }

        tracing::info!(
            network = %self.name,
            left = %format_args!("{}/{}", left.node, left.interface.name),
            right = %format_args!("{}/{}", right.node, right.interface.name),
            "Adding link"
        );

        let control = self.host_node.base().handle().clone();
        let (eph_left, eph_right) = link::ephemeral_names();
        link::create_veth_pair(&control, &eph_left, &eph_right).await?;

        for (ephemeral, end) in [(&eph_left, left), (&eph_right, right)] {
            let Some(node) = self.nodes.get_mut(&end.node) else {
                link::discard_ephemerals(&control, &[&eph_left, &eph_right]).await;
                return Err(GontError::NodeNotFound { name: end.node });
            };
            if let Err(e) = attach_to(&control, node, ephemeral, end.interface, end.routes).await {
                link::discard_ephemerals(&control, &[&eph_left, &eph_right]).await;
                return Err(e);
            }
        }

        self.update_hosts_file()
    }

    /// Probe connectivity between every ordered pair of host-like nodes.
    ///
    /// # Errors
    ///
    /// Returns the first failing pair's error, fail-fast.
    pub async fn test_connectivity(&self) -> GontResult<()> {
        let hosts: Vec<&Host> = self.nodes.values().filter_map(Node::as_host).collect();
        probe::test_connectivity(&hosts).await
    }

    /// Regenerate the shared hosts file from the registered nodes.
    ///
    /// The file is rewritten wholesale on every call: loopback entries
    /// first, then one line per distinct address naming every `<host>`
    /// and `<host>-<interface>` that resolves to it.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn update_hosts_file(&self) -> GontResult<()> {
        let mut entries = Vec::new();
        for node in self.nodes.values() {
            let Some(host) = node.as_host() else {
                continue;
            };
            for iface in host.base().interfaces() {
                for (addr, _) in &iface.addresses {
                    entries.push(HostsEntry {
                        addr: *addr,
                        node: host.name().to_string(),
                        ifname: iface.name.clone(),
                    });
                }
            }
        }
        hosts::write(&self.paths.hosts_file(), &entries)
    }

    /// Tear the whole topology down and remove its persisted state.
    ///
    /// Nodes are torn down in no particular order; the first failure
    /// aborts the rest and is returned, leaving a partial state that
    /// remains recoverable via
    /// [`cleanup_network`](crate::registry::cleanup_network). Calling
    /// teardown again on an already-torn-down network succeeds.
    ///
    /// # Errors
    ///
    /// Returns the first node-teardown failure.
    pub fn teardown(&mut self) -> GontResult<()> {
        while let Some((name, node)) = self.nodes.pop_first() {
            tracing::debug!(network = %self.name, node = %name, "Tearing down node");
            node.base().teardown()?;
        }

        // The control namespace belongs to the caller and is never
        // deleted; only its netlink channel is shut down.
        self.host_node.base().teardown()?;

        if let Err(e) = fs::remove_dir_all(&self.paths.base) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(network = %self.name, error = %e, "Leaving state directory behind");
            }
        }

        tracing::info!(network = %self.name, "Network torn down");
        Ok(())
    }

    /// Tear down unless the network is persistent.
    ///
    /// Persistent networks survive process exit and are removable only
    /// via a later explicit cleanup.
    ///
    /// # Errors
    ///
    /// Propagates [`Network::teardown`] failures.
    pub fn close(mut self) -> GontResult<()> {
        if self.persistent {
            tracing::info!(network = %self.name, "Leaving persistent network running");
            Ok(())
        } else {
            self.teardown()
        }
    }

    /// Validate a node name, check for collisions, and allocate the
    /// namespace plus declared configuration.
    async fn allocate(
        &self,
        name: &str,
        options: &[&dyn TopologyOption],
    ) -> GontResult<(BaseNode, NodeConfig)> {
        names::validate_name(name)?;
        if self.nodes.contains_key(name) || self.paths.node(name).exists() {
            return Err(GontError::NodeExists {
                name: name.to_string(),
            });
        }

        let base = BaseNode::new(&self.name, name).await?;

        // Network-wide defaults first, then the call's own options.
        let mut config = NodeConfig::default();
        options::apply_node(&self.default_option_refs(), &mut config);
        options::apply_node(options, &mut config);

        Ok((base, config))
    }

    fn default_option_refs(&self) -> Vec<&dyn TopologyOption> {
        self.default_options
            .iter()
            .map(|o| &**o as &dyn TopologyOption)
            .collect()
    }

    /// Configure a constructed node, persist it, and register it.
    async fn commit(&mut self, mut node: Node, config: NodeConfig) -> GontResult<()> {
        if let Err(e) = self.configure(&mut node, config).await {
            node.base().discard();
            return Err(e);
        }

        if let Err(e) = self.persist(node.base()) {
            let _ = fs::remove_dir_all(self.paths.node(node.name()));
            node.base().discard();
            return Err(e);
        }

        let resolves = node.as_host().is_some();
        self.nodes.insert(node.name().to_string(), node);

        if resolves {
            self.update_hosts_file()?;
        }
        Ok(())
    }

    /// Wire declared interfaces and install declared routes and filters.
    async fn configure(&mut self, node: &mut Node, config: NodeConfig) -> GontResult<()> {
        for declared in config.interfaces {
            self.wire_declared(node, declared).await?;
        }
        node.base_mut().install_routes(config.routes).await?;
        node.base_mut().attach_filters(config.filters);
        Ok(())
    }

    /// Realize one interface declared at node construction.
    ///
    /// On a switch, the declared interface (with its addresses) lands on
    /// the peer and the switch grows a fresh enslaved port; on a host or
    /// router it is the other way around when the peer is a switch. A
    /// plain peer receives a fresh `veth-<node>` endpoint.
    async fn wire_declared(&mut self, node: &mut Node, declared: Iface) -> GontResult<()> {
        let peer_name = declared.peer;

        let own_iface;
        let peer_iface;
        if let Node::Switch(sw) = &*node {
            own_iface = Interface::new(sw.next_port_name());
            peer_iface = declared.interface;
            if !self.nodes.contains_key(&peer_name) {
                return Err(GontError::NodeNotFound { name: peer_name });
            }
        } else {
            let peer = self
                .nodes
                .get(&peer_name)
                .ok_or_else(|| GontError::NodeNotFound {
                    name: peer_name.clone(),
                })?;
            peer_iface = match peer.as_switch() {
                Some(sw) => Interface::new(sw.next_port_name()),
                None => {
                    let far = format!("veth-{}", node.name());
                    names::validate_ifname(&far)?;
                    Interface::new(far)
                }
            };
            own_iface = declared.interface;
        }

        let control = self.host_node.base().handle().clone();
        let (eph_own, eph_peer) = link::ephemeral_names();
        link::create_veth_pair(&control, &eph_own, &eph_peer).await?;

        if let Err(e) = attach_to(&control, node, &eph_own, own_iface, Vec::new()).await {
            link::discard_ephemerals(&control, &[&eph_own, &eph_peer]).await;
            return Err(e);
        }

        let Some(peer) = self.nodes.get_mut(&peer_name) else {
            link::discard_ephemerals(&control, &[&eph_own, &eph_peer]).await;
            return Err(GontError::NodeNotFound { name: peer_name });
        };
        if let Err(e) = attach_to(&control, peer, &eph_peer, peer_iface, Vec::new()).await {
            link::discard_ephemerals(&control, &[&eph_own, &eph_peer]).await;
            return Err(e);
        }
        Ok(())
    }

    /// Create the node's state directory and namespace handle link.
    fn persist(&self, base: &BaseNode) -> GontResult<()> {
        fs::create_dir_all(self.paths.node_ns(base.name()))?;

        let target = PathBuf::from(NETNS_DIR).join(base.namespace().name());
        std::os::unix::fs::symlink(target, self.paths.node_ns_net(base.name()))?;
        Ok(())
    }
}

/// Move one prepared veth end into `node` and configure it there.
async fn attach_to(
    control: &rtnetlink::Handle,
    node: &mut Node,
    ephemeral: &str,
    interface: Interface,
    routes: Vec<Route>,
) -> GontResult<()> {
    link::move_and_rename(
        control,
        ephemeral,
        &interface.name,
        node.base().namespace().raw_fd(),
    )
    .await?;

    match node {
        Node::Switch(sw) => sw.enslave(&interface.name, interface.mtu).await?,
        _ => link::configure(node.base().handle(), &interface).await?,
    }

    if !routes.is_empty() {
        node.base_mut().install_routes(routes).await?;
    }
    node.base_mut().adopt_interface(interface)
}

//! # gont
//!
//! A single-host virtual network testbed built on Linux network
//! namespaces. Gont assembles multi-node topologies of hosts, switches,
//! and routers out of namespaces, veth pairs, and kernel bridges, so
//! networked software runs against a real kernel stack without virtual
//! machines or containers.
//!
//! All of it requires `CAP_NET_ADMIN`; see [`check_caps`].
//!
//! ```no_run
//! use gont::{Network, options};
//!
//! # async fn example() -> gont::GontResult<()> {
//! let mut network = Network::new("", &[]).await?;
//!
//! network.add_switch("sw", &[]).await?;
//! network
//!     .add_host("h1", &[&options::iface("veth0", "sw", &[&options::ipv4(10, 0, 0, 1, 24)])])
//!     .await?;
//! network
//!     .add_host("h2", &[&options::iface("veth0", "sw", &[&options::ipv4(10, 0, 0, 2, 24)])])
//!     .await?;
//!
//! network.test_connectivity().await?;
//! network.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod caps;
mod hosts;
pub mod iface;
pub mod link;
pub mod namespace;
pub mod network;
pub mod node;
pub mod options;
pub mod probe;
pub mod registry;

pub use caps::check_caps;
pub use gont_common::{GontError, GontResult};
pub use iface::Interface;
pub use link::LinkEnd;
pub use namespace::Namespace;
pub use network::Network;
pub use node::{Host, Node, Router, Switch};
pub use probe::test_connectivity;
pub use registry::{
    cleanup_all_networks, cleanup_network, generate_network_name, identify, network_names,
    node_names,
};

//! Switch nodes.

use gont_common::{GontError, GontResult};
use rtnetlink::{LinkBridge, LinkUnspec};

use super::BaseNode;
use crate::link;
use crate::options::BridgeConfig;

/// Name of the bridge device inside every switch namespace.
pub const BRIDGE_NAME: &str = "br";

/// A node owning a kernel bridge.
///
/// Interfaces attached to a switch become bridge ports: they are
/// enslaved into the bridge master instead of carrying addresses, and
/// the bridge forwards frames layer-2 among all of them.
#[derive(Debug)]
pub struct Switch {
    base: BaseNode,
    bridge: BridgeConfig,
}

impl Switch {
    /// Create the bridge device inside the node's namespace and bring it
    /// up, with bridge-level options already applied.
    ///
    /// A bridge failure discards the fresh base node, namespace
    /// included, so nothing half-built leaks.
    pub(crate) async fn new(base: BaseNode, bridge: BridgeConfig) -> GontResult<Self> {
        let mut builder = LinkBridge::new(BRIDGE_NAME).up();
        if let Some(mtu) = bridge.mtu {
            builder = builder.mtu(mtu);
        }

        let added = base
            .handle()
            .link()
            .add(builder.build())
            .execute()
            .await
            .map_err(|e| {
                GontError::netlink(format!("add bridge {BRIDGE_NAME} in node {}", base.name()), e)
            });
        if let Err(e) = added {
            base.discard();
            return Err(e);
        }

        tracing::debug!(node = base.name(), bridge = BRIDGE_NAME, "Created bridge");
        Ok(Self { base, bridge })
    }

    /// Shared node state.
    #[must_use]
    pub fn base(&self) -> &BaseNode {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseNode {
        &mut self.base
    }

    /// The switch's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// MTU configured on the bridge device, if any.
    #[must_use]
    pub fn bridge_mtu(&self) -> Option<u32> {
        self.bridge.mtu
    }

    /// Name for the next bridge port, unique within the namespace.
    ///
    /// Ports are numbered in attachment order.
    pub(crate) fn next_port_name(&self) -> String {
        format!("p{}", self.base.interfaces().len())
    }

    /// Enslave an interface into the bridge master and bring it up.
    pub(crate) async fn enslave(&self, ifname: &str, mtu: Option<u32>) -> GontResult<()> {
        let bridge_index = link::link_index(self.base.handle(), BRIDGE_NAME).await?;

        let mut builder = LinkUnspec::new_with_name(ifname)
            .controller(bridge_index)
            .up();
        if let Some(mtu) = mtu {
            builder = builder.mtu(mtu);
        }

        self.base
            .handle()
            .link()
            .set(builder.build())
            .execute()
            .await
            .map_err(|e| {
                GontError::netlink(
                    format!("enslave {ifname} into {BRIDGE_NAME} on {}", self.name()),
                    e,
                )
            })?;

        tracing::debug!(node = self.name(), port = ifname, "Attached bridge port");
        Ok(())
    }
}

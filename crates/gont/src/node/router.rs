//! Router nodes.

use std::ops::Deref;

use gont_common::GontResult;

use super::{BaseNode, Host};

/// A host with packet forwarding enabled.
///
/// Forwarding is flipped on during construction, before the node is
/// registered anywhere: a router whose forwarding cannot be enabled
/// never becomes visible.
#[derive(Debug)]
pub struct Router {
    host: Host,
}

impl Router {
    /// Wrap an unregistered host, enabling forwarding first.
    ///
    /// A forwarding failure discards the host, namespace included.
    pub(crate) async fn new(host: Host) -> GontResult<Self> {
        if let Err(e) = host.enable_forwarding().await {
            host.base().discard();
            return Err(e);
        }
        Ok(Self { host })
    }

    /// The underlying host.
    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Shared node state.
    #[must_use]
    pub fn base(&self) -> &BaseNode {
        self.host.base()
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseNode {
        self.host.base_mut()
    }
}

impl Deref for Router {
    type Target = Host;

    fn deref(&self) -> &Self::Target {
        &self.host
    }
}

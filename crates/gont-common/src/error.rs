//! Common error types for the gont ecosystem.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`GontError`].
pub type GontResult<T> = Result<T, GontError>;

/// Common errors across the gont ecosystem.
#[derive(Error, Diagnostic, Debug)]
pub enum GontError {
    /// The process lacks a required capability.
    #[error("Missing capability: {capability}")]
    #[diagnostic(
        code(gont::caps::missing),
        help("Run as root or grant the capability, e.g. `sudo setcap cap_net_admin+ep <binary>`")
    )]
    PrivilegeRequired {
        /// The capability that is missing from the effective set.
        capability: String,
    },

    /// A network with this name already has persisted state.
    #[error("Network already exists: {name}")]
    #[diagnostic(
        code(gont::network::exists),
        help("Tear down the previous instance or remove stale state with `cleanup_network`")
    )]
    NetworkExists {
        /// The colliding network name.
        name: String,
    },

    /// A node with this name is already registered.
    #[error("Node already exists: {name}")]
    #[diagnostic(code(gont::node::exists))]
    NodeExists {
        /// The colliding node name.
        name: String,
    },

    /// No node with this name is registered.
    #[error("Node not found: {name}")]
    #[diagnostic(code(gont::node::not_found))]
    NodeNotFound {
        /// The node name that was not found.
        name: String,
    },

    /// The node already carries an interface with this name.
    #[error("Interface already exists on node {node}: {interface}")]
    #[diagnostic(code(gont::interface::exists))]
    InterfaceExists {
        /// The owning node.
        node: String,
        /// The colliding interface name.
        interface: String,
    },

    /// Invalid network, node, or interface name.
    #[error("Invalid name: {name:?}")]
    #[diagnostic(
        code(gont::invalid_name),
        help("Names must be non-empty, free of '/' and whitespace, and short enough to form a namespace file name")
    )]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Invalid address or prefix notation.
    #[error("Invalid address: {value}")]
    #[diagnostic(
        code(gont::invalid_address),
        help("Use CIDR notation such as '10.0.0.1/24' or 'fc00::1/64'")
    )]
    InvalidAddress {
        /// The rejected value.
        value: String,
    },

    /// A namespace syscall failed.
    #[error("Namespace operation failed: {operation}: {source}")]
    #[diagnostic(code(gont::namespace))]
    Namespace {
        /// The operation that failed.
        operation: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A netlink request failed.
    #[error("Netlink operation failed: {operation}: {source}")]
    #[diagnostic(code(gont::netlink))]
    Netlink {
        /// The operation that failed.
        operation: String,
        /// The underlying netlink error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to launch an external command.
    #[error("Failed to execute {command}: {source}")]
    #[diagnostic(
        code(gont::exec),
        help("The binary must be installed and reachable through PATH")
    )]
    Exec {
        /// The command that could not be executed.
        command: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Cleanup could not enumerate per-node state.
    #[error("Cannot enumerate node directories under {path}: {source}")]
    #[diagnostic(code(gont::cleanup::enumerate))]
    CleanupEnumeration {
        /// The directory that could not be read.
        path: PathBuf,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A probe target carries no address to ping.
    #[error("Node has no address to probe: {node}")]
    #[diagnostic(
        code(gont::probe::no_address),
        help("Assign at least one address to the target's interfaces")
    )]
    NoAddress {
        /// The target node.
        node: String,
    },

    /// A connectivity probe between two nodes failed.
    #[error("Probe from {from} to {to} failed: {detail}")]
    #[diagnostic(code(gont::probe::failed))]
    Probe {
        /// The probing node.
        from: String,
        /// The probed node.
        to: String,
        /// Captured probe output or error description.
        detail: String,
    },

    /// The calling process is not inside any known node namespace.
    #[error("Current network namespace does not belong to any known node")]
    #[diagnostic(code(gont::identify::no_match))]
    UnidentifiedNamespace,

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(gont::io))]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(gont::internal),
        help("This is a bug, please report it at https://github.com/gont-rs/gont/issues")
    )]
    Internal {
        /// The error message.
        message: String,
    },
}

impl GontError {
    /// Wrap an OS error with namespace-operation context.
    pub fn namespace(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Namespace {
            operation: operation.into(),
            source,
        }
    }

    /// Wrap a netlink error with request context.
    pub fn netlink(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Netlink {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = GontError::NetworkExists {
            name: "zuse".to_string(),
        };
        assert_eq!(err.to_string(), "Network already exists: zuse");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GontError = io_err.into();
        assert!(matches!(err, GontError::Io(_)));
    }

    #[test]
    fn namespace_context() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "EPERM");
        let err = GontError::namespace("unshare", io_err);
        assert!(err.to_string().contains("unshare"));
    }
}

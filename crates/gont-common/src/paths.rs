//! Standard filesystem paths for gont runtime state.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// Environment variable overriding the runtime-state root.
pub const GONT_DIR_ENV: &str = "GONT_DIR";

/// Default runtime-state root when [`GONT_DIR_ENV`] is unset.
pub static DEFAULT_RUNTIME_DIR: Lazy<PathBuf> = Lazy::new(|| PathBuf::from("/var/run/gont"));

/// Resolve the runtime-state root.
///
/// The environment is consulted on every call, so a test harness can point
/// each process at its own disposable root.
#[must_use]
pub fn runtime_dir() -> PathBuf {
    std::env::var_os(GONT_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| DEFAULT_RUNTIME_DIR.clone())
}

/// Filesystem layout of one network's persisted state.
///
/// ```text
/// <root>/<network>/files/etc/hosts      generated hosts file
/// <root>/<network>/nodes/<node>/ns/net  handle on the node's namespace
/// ```
#[derive(Debug, Clone)]
pub struct NetworkPaths {
    /// Base directory of this network's state tree.
    pub base: PathBuf,
}

impl NetworkPaths {
    /// Paths for a network under the default runtime root.
    #[must_use]
    pub fn new(network: &str) -> Self {
        Self::in_root(&runtime_dir(), network)
    }

    /// Paths for a network under an explicit runtime root.
    #[must_use]
    pub fn in_root(root: &Path, network: &str) -> Self {
        Self {
            base: root.join(network),
        }
    }

    /// Directory for generated files shared by all nodes.
    #[must_use]
    pub fn files(&self) -> PathBuf {
        self.base.join("files")
    }

    /// Directory mirroring `/etc` for generated files.
    #[must_use]
    pub fn etc(&self) -> PathBuf {
        self.files().join("etc")
    }

    /// The generated hosts file.
    #[must_use]
    pub fn hosts_file(&self) -> PathBuf {
        self.etc().join("hosts")
    }

    /// Directory holding one subdirectory per node.
    #[must_use]
    pub fn nodes(&self) -> PathBuf {
        self.base.join("nodes")
    }

    /// Directory for a specific node.
    #[must_use]
    pub fn node(&self, name: &str) -> PathBuf {
        self.nodes().join(name)
    }

    /// Namespace state directory for a node.
    #[must_use]
    pub fn node_ns(&self, name: &str) -> PathBuf {
        self.node(name).join("ns")
    }

    /// Handle path for a node's network namespace.
    #[must_use]
    pub fn node_ns_net(&self, name: &str) -> PathBuf {
        self.node_ns(name).join("net")
    }

    /// Create the directory skeleton for a fresh network.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn create_skeleton(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.etc())?;
        std::fs::create_dir_all(self.nodes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let paths = NetworkPaths::in_root(Path::new("/var/run/gont"), "zuse");
        assert_eq!(
            paths.hosts_file(),
            PathBuf::from("/var/run/gont/zuse/files/etc/hosts")
        );
        assert_eq!(
            paths.node_ns_net("h1"),
            PathBuf::from("/var/run/gont/zuse/nodes/h1/ns/net")
        );
    }

    #[test]
    fn skeleton() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NetworkPaths::in_root(dir.path(), "lovelace");
        paths.create_skeleton().unwrap();
        assert!(paths.etc().is_dir());
        assert!(paths.nodes().is_dir());
        assert!(!paths.hosts_file().exists());
    }

    #[test]
    fn default_root_fallback() {
        // The override variable is not set in the test environment by default.
        if std::env::var_os(GONT_DIR_ENV).is_none() {
            assert_eq!(runtime_dir(), PathBuf::from("/var/run/gont"));
        }
    }
}

//! Persisted-state registry: name generation, enumeration, and cleanup.
//!
//! Networks persist as directory trees under the runtime root, so
//! everything here works from directory listings alone. That is what
//! makes cleanup possible for crashed runs: nothing but a network name is
//! needed to find and remove its leftovers.

use std::fs;
use std::io;
use std::path::Path;

use gont_common::paths::{NetworkPaths, runtime_dir};
use gont_common::{GontError, GontResult, names};
use rand::Rng;

use crate::namespace::Namespace;

/// Names of all networks with persisted state, sorted.
///
/// A missing or unreadable runtime root means no instances, not failure.
#[must_use]
pub fn network_names() -> Vec<String> {
    dir_names(&runtime_dir())
}

/// Names of all persisted nodes of `network`, sorted.
#[must_use]
pub fn node_names(network: &str) -> Vec<String> {
    dir_names(&NetworkPaths::new(network).nodes())
}

fn dir_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    names.sort_unstable();
    names
}

/// Generate a network name absent from the persisted networks.
///
/// Up to 32 random draws from the curated word list are checked against
/// the existing names; if all collide, a numerically suffixed word is
/// returned instead. Bounded and terminating, but not a hard uniqueness
/// guarantee: a subsequent "already exists" from network creation must be
/// treated as retryable.
#[must_use]
pub fn generate_network_name() -> String {
    generate_name_among(&network_names())
}

fn generate_name_among(existing: &[String]) -> String {
    for _ in 0..32 {
        let candidate = names::random_name();
        if existing
            .binary_search_by(|name| name.as_str().cmp(candidate))
            .is_err()
        {
            return candidate.to_string();
        }
    }

    let suffix = rand::thread_rng().gen_range(1..=128);
    format!("{}-{}", names::random_name(), suffix)
}

/// Remove all persisted state of `network`, including its namespaces.
///
/// Works without any in-memory handle: node namespaces are rediscovered
/// from the node directories via the `gont-<network>-<node>` naming
/// convention. Per-namespace deletion failures are tolerated to maximize
/// cleanup progress; an absent network tree is success.
///
/// # Errors
///
/// Fails only if the node directory exists but cannot be enumerated, or
/// the tree cannot be removed.
pub fn cleanup_network(network: &str) -> GontResult<()> {
    cleanup_network_in(&runtime_dir(), network)
}

pub(crate) fn cleanup_network_in(root: &Path, network: &str) -> GontResult<()> {
    let paths = NetworkPaths::in_root(root, network);
    let nodes_dir = paths.nodes();

    match fs::read_dir(&nodes_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                    continue;
                }
                let Ok(node) = entry.file_name().into_string() else {
                    continue;
                };
                let ns_name = format!("gont-{network}-{node}");
                if let Err(e) = Namespace::delete_named(&ns_name) {
                    tracing::warn!(namespace = %ns_name, error = %e, "Leaving namespace behind");
                }
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(GontError::CleanupEnumeration {
                path: nodes_dir,
                source: e,
            });
        }
    }

    match fs::remove_dir_all(&paths.base) {
        Ok(()) => {
            tracing::info!(network, "Removed persisted network state");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Clean up every discovered network, stopping at the first hard error.
///
/// # Errors
///
/// Propagates the first [`cleanup_network`] failure.
pub fn cleanup_all_networks() -> GontResult<()> {
    for network in network_names() {
        cleanup_network(&network)?;
    }
    Ok(())
}

/// Identify the namespace the calling thread currently runs in.
///
/// Compares the caller's namespace identity against every persisted
/// node's namespace handle and returns the `(network, node)` pair on a
/// match. Nodes whose persisted handle can no longer be opened (partial
/// cleanup) are skipped.
///
/// # Errors
///
/// Returns [`GontError::UnidentifiedNamespace`] when the caller is not
/// inside any known node namespace.
pub fn identify() -> GontResult<(String, String)> {
    let current = Namespace::current()?;

    for network in network_names() {
        let paths = NetworkPaths::new(&network);
        for node in node_names(&network) {
            let path = paths.node_ns_net(&node);
            match Namespace::open_at(&path, &node) {
                Ok(handle) if handle == current => return Ok((network, node)),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(network = %network, node = %node, error = %e, "Skipping stale node state");
                }
            }
        }
    }

    Err(GontError::UnidentifiedNamespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_network(root: &Path, network: &str, nodes: &[&str]) {
        let paths = NetworkPaths::in_root(root, network);
        paths.create_skeleton().unwrap();
        for node in nodes {
            fs::create_dir_all(paths.node_ns(node)).unwrap();
        }
    }

    #[test]
    fn enumeration_lists_sorted_directories() {
        let dir = tempfile::tempdir().unwrap();
        fake_network(dir.path(), "zuse", &["h2", "h1"]);
        fake_network(dir.path(), "ada", &[]);
        fs::write(dir.path().join("not-a-network"), b"").unwrap();

        assert_eq!(dir_names(dir.path()), vec!["ada", "zuse"]);
        let paths = NetworkPaths::in_root(dir.path(), "zuse");
        assert_eq!(dir_names(&paths.nodes()), vec!["h1", "h2"]);
    }

    #[test]
    fn absent_root_means_no_instances() {
        let dir = tempfile::tempdir().unwrap();
        assert!(dir_names(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn generated_name_avoids_existing() {
        // Occupy a handful of words; the generator must dodge them.
        let taken: Vec<String> = names::NAMES[..8].iter().map(ToString::to_string).collect();
        for _ in 0..100 {
            let name = generate_name_among(&taken);
            assert!(!taken.contains(&name), "{name} is already taken");
        }
    }

    #[test]
    fn exhausted_word_list_falls_back_to_suffix() {
        let taken: Vec<String> = names::NAMES.iter().map(ToString::to_string).collect();
        let name = generate_name_among(&taken);
        let (word, suffix) = name.rsplit_once('-').unwrap();
        assert!(names::NAMES.contains(&word));
        assert!(suffix.parse::<u32>().is_ok_and(|n| (1..=128).contains(&n)));
    }

    #[test]
    fn cleanup_removes_tree_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        fake_network(dir.path(), "zuse", &["h1"]);

        cleanup_network_in(dir.path(), "zuse").unwrap();
        assert!(!dir.path().join("zuse").exists());

        // Second cleanup of the same name: already gone, still success.
        cleanup_network_in(dir.path(), "zuse").unwrap();
    }

    #[test]
    fn cleanup_without_nodes_dir_still_removes_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("zuse/files")).unwrap();

        cleanup_network_in(dir.path(), "zuse").unwrap();
        assert!(!dir.path().join("zuse").exists());
    }
}

//! Generated hosts file.
//!
//! The file is regenerated wholesale on every change, never patched, so
//! readers only ever observe complete snapshots. Output is deterministic:
//! addresses sort IPv4 before IPv6 and numerically within each family,
//! and the names on one line are gathered in sorted node order.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;

use gont_common::GontResult;

const HEADER: &str = "# Autogenerated hosts file by gont";

/// The fixed loopback entries heading every generated file.
const LOOPBACK: &[(&str, &str)] = &[
    (
        "127.0.0.1",
        "localhost localhost.localdomain localhost4 localhost4.localdomain4",
    ),
    (
        "::1",
        "localhost localhost.localdomain localhost6 localhost6.localdomain6",
    ),
    ("ff02::1", "ip6-allnodes"),
    ("ff02::2", "ip6-allrouters"),
];

/// One address contributed by one host interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostsEntry {
    /// The reachable address.
    pub addr: IpAddr,
    /// The contributing node.
    pub node: String,
    /// The interface carrying the address.
    pub ifname: String,
}

/// Render the complete hosts file for the given entries.
///
/// Every distinct address gets one line listing `<host>` and
/// `<host>-<ifname>` for each contributor. The result is byte-stable
/// under permutation of the input.
pub(crate) fn render(entries: &[HostsEntry]) -> String {
    // IpAddr's derived ordering puts all V4 addresses before V6.
    let mut by_addr: BTreeMap<IpAddr, Vec<(&str, &str)>> = BTreeMap::new();
    for entry in entries {
        by_addr
            .entry(entry.addr)
            .or_default()
            .push((entry.node.as_str(), entry.ifname.as_str()));
    }

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    for (addr, names) in LOOPBACK {
        out.push_str(addr);
        out.push(' ');
        out.push_str(names);
        out.push('\n');
    }

    for (addr, mut contributors) in by_addr {
        contributors.sort_unstable();
        contributors.dedup();

        let mut names: Vec<String> = Vec::new();
        for (node, ifname) in contributors {
            if names.iter().all(|n| n != node) {
                names.push(node.to_string());
            }
            names.push(format!("{node}-{ifname}"));
        }

        out.push_str(&format!("{addr} {}\n", names.join(" ")));
    }

    out
}

/// Rewrite the hosts file at `path` from scratch and sync it to disk.
pub(crate) fn write(path: &Path, entries: &[HostsEntry]) -> GontResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    file.write_all(render(entries).as_bytes())?;
    file.sync_all()?;

    tracing::debug!(path = %path.display(), entries = entries.len(), "Rewrote hosts file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn entry(addr: &str, node: &str, ifname: &str) -> HostsEntry {
        HostsEntry {
            addr: addr.parse().unwrap(),
            node: node.to_string(),
            ifname: ifname.to_string(),
        }
    }

    #[test]
    fn empty_network_renders_header_and_loopback() {
        let out = render(&[]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with('#'));
        assert!(lines[1].starts_with("127.0.0.1 localhost"));
        assert!(lines[2].starts_with("::1 localhost"));
        assert_eq!(lines[3], "ff02::1 ip6-allnodes");
        assert_eq!(lines[4], "ff02::2 ip6-allrouters");
    }

    #[test]
    fn hosts_contribute_name_and_interface_alias() {
        let out = render(&[
            entry("10.0.0.1", "h1", "veth0"),
            entry("10.0.0.2", "h2", "veth0"),
        ]);
        assert!(out.contains("10.0.0.1 h1 h1-veth0\n"));
        assert!(out.contains("10.0.0.2 h2 h2-veth0\n"));
    }

    #[test]
    fn shared_address_joins_all_names_on_one_line() {
        let out = render(&[
            entry("10.0.0.1", "h2", "veth1"),
            entry("10.0.0.1", "h1", "veth0"),
        ]);
        assert!(out.contains("10.0.0.1 h1 h1-veth0 h2 h2-veth1\n"));
    }

    #[test]
    fn ipv4_sorts_before_ipv6() {
        let out = render(&[
            entry("fc00::1", "h1", "veth0"),
            entry("10.0.0.1", "h1", "veth0"),
        ]);
        let v4 = out.find("\n10.0.0.1 ").unwrap();
        let v6 = out.find("\nfc00::1 ").unwrap();
        assert!(v4 < v6);
    }

    #[test]
    fn duplicate_entries_collapse() {
        let out = render(&[
            entry("10.0.0.1", "h1", "veth0"),
            entry("10.0.0.1", "h1", "veth0"),
        ]);
        assert!(out.contains("10.0.0.1 h1 h1-veth0\n"));
    }

    #[test]
    fn write_creates_parents_and_is_rereadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files/etc/hosts");
        let entries = vec![entry("10.0.0.1", "h1", "veth0")];
        write(&path, &entries).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), render(&entries));
    }

    fn sample_entries() -> Vec<HostsEntry> {
        vec![
            entry("10.0.0.1", "h1", "veth0"),
            entry("10.0.0.2", "h2", "veth0"),
            entry("10.0.0.2", "h2", "veth1"),
            entry("fc00::1", "h1", "veth0"),
            entry("10.0.0.3", "r1", "eth0"),
            entry("10.0.0.2", "h3", "veth0"),
        ]
    }

    proptest! {
        #[test]
        fn rendering_is_order_independent(shuffled in Just(sample_entries()).prop_shuffle()) {
            prop_assert_eq!(render(&shuffled), render(&sample_entries()));
        }
    }

    #[test]
    fn repeated_rendering_is_byte_stable() {
        let entries = sample_entries();
        assert_eq!(render(&entries), render(&entries));
    }
}

//! Capability precondition.
//!
//! Everything this crate does against the kernel requires network-admin
//! privilege, and the crate cannot self-elevate. The single query here is
//! the boundary: callers check it once up front and get a diagnostic
//! error instead of a string of EPERMs later.

use gont_common::{GontError, GontResult};

/// Check that the process may manipulate namespaces, links, and bridges.
///
/// # Errors
///
/// Returns [`GontError::PrivilegeRequired`] if `CAP_NET_ADMIN` is missing
/// from the effective set.
pub fn check_caps() -> GontResult<()> {
    let held = caps::has_cap(
        None,
        caps::CapSet::Effective,
        caps::Capability::CAP_NET_ADMIN,
    )
    .map_err(|e| GontError::Internal {
        message: format!("Failed to read capability set: {e}"),
    })?;

    if held {
        Ok(())
    } else {
        Err(GontError::PrivilegeRequired {
            capability: "CAP_NET_ADMIN".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_holds_net_admin() {
        if rustix::process::geteuid().is_root() {
            check_caps().unwrap();
        }
    }

    #[test]
    fn missing_capability_is_diagnosed() {
        if rustix::process::geteuid().is_root() {
            return;
        }
        // Unprivileged test runs exercise the error path. CAP_NET_ADMIN
        // could still be granted via ambient capabilities, so only check
        // the variant when the query actually fails.
        if let Err(err) = check_caps() {
            assert!(matches!(err, GontError::PrivilegeRequired { .. }));
        }
    }
}

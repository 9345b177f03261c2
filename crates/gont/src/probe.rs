//! Connectivity verification.
//!
//! Reachability is checked with the external `ping` binary executed
//! inside the probing node's namespace; the probe surface of a node is
//! its public host interface and nothing more.

use gont_common::GontResult;

use crate::node::Host;

/// Probe every ordered pair of distinct hosts, failing fast.
///
/// # Errors
///
/// Returns the first failing pair's error: [`NoAddress`] for an
/// unaddressed target, [`Probe`] for an unanswered echo.
///
/// [`NoAddress`]: gont_common::GontError::NoAddress
/// [`Probe`]: gont_common::GontError::Probe
pub async fn test_connectivity(hosts: &[&Host]) -> GontResult<()> {
    for a in hosts {
        for b in hosts {
            if a.name() == b.name() {
                continue;
            }
            a.ping(b).await?;
        }
    }
    Ok(())
}

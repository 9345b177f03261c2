//! Host nodes.

use std::fs;
use std::net::IpAddr;
use std::process::{Command, Output};

use gont_common::{GontError, GontResult};

use super::BaseNode;
use crate::iface::Interface;
use crate::namespace::NamespaceGuard;

/// A plain topology node: one namespace, veth endpoint interfaces.
#[derive(Debug)]
pub struct Host {
    base: BaseNode,
}

impl Host {
    pub(crate) fn from_base(base: BaseNode) -> Self {
        Self { base }
    }

    /// Shared node state.
    #[must_use]
    pub fn base(&self) -> &BaseNode {
        &self.base
    }

    pub(crate) fn base_mut(&mut self) -> &mut BaseNode {
        &mut self.base
    }

    /// The host's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    /// First address suited for probing: IPv4 if any interface carries
    /// one, otherwise the first address of any family.
    #[must_use]
    pub fn probe_address(&self) -> Option<IpAddr> {
        let interfaces = self.base.interfaces();
        interfaces
            .iter()
            .find_map(|i| i.probe_address().filter(IpAddr::is_ipv4))
            .or_else(|| interfaces.iter().find_map(Interface::probe_address))
    }

    /// Run an external command inside the host's namespace.
    ///
    /// The command executes on a blocking thread which enters the
    /// namespace for exactly the duration of the call; the thread's
    /// original namespace is restored on every exit path.
    ///
    /// # Errors
    ///
    /// Fails if the namespace cannot be entered or the command cannot be
    /// launched. A non-zero exit status is not an error here; callers
    /// inspect the returned [`Output`].
    pub async fn run(&self, command: &str, args: &[&str]) -> GontResult<Output> {
        let ns = self.base.namespace().file_handle();
        let command = command.to_string();
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();

        tokio::task::spawn_blocking(move || {
            let guard = NamespaceGuard::enter_file(&ns)?;
            let output = Command::new(&command)
                .args(&args)
                .output()
                .map_err(|e| GontError::Exec { command, source: e });
            guard.exit()?;
            output
        })
        .await
        .map_err(|e| GontError::Internal {
            message: format!("Namespace exec task failed: {e}"),
        })?
    }

    /// Enable IPv4 and IPv6 packet forwarding inside the namespace.
    ///
    /// # Errors
    ///
    /// Fails if either sysctl cannot be written.
    pub async fn enable_forwarding(&self) -> GontResult<()> {
        let ns = self.base.namespace().file_handle();
        let name = self.name().to_string();

        tokio::task::spawn_blocking(move || {
            let guard = NamespaceGuard::enter_file(&ns)?;
            let written = write_forwarding_sysctls();
            guard.exit()?;
            written
        })
        .await
        .map_err(|e| GontError::Internal {
            message: format!("Namespace sysctl task failed: {e}"),
        })??;

        tracing::debug!(node = %name, "Enabled packet forwarding");
        Ok(())
    }

    /// Probe reachability of `target` with a single ICMP echo.
    ///
    /// The target is addressed by its first probe address; a target
    /// without any address fails immediately.
    ///
    /// # Errors
    ///
    /// Returns [`GontError::NoAddress`] for an unaddressed target and
    /// [`GontError::Probe`] when the echo goes unanswered.
    pub async fn ping(&self, target: &Self) -> GontResult<()> {
        let addr = target.probe_address().ok_or_else(|| GontError::NoAddress {
            node: target.name().to_string(),
        })?;

        let output = self
            .run("ping", &["-c", "1", "-W", "2", &addr.to_string()])
            .await?;
        if output.status.success() {
            tracing::debug!(from = self.name(), to = target.name(), %addr, "Ping succeeded");
            Ok(())
        } else {
            Err(GontError::Probe {
                from: self.name().to_string(),
                to: target.name().to_string(),
                detail: probe_detail(&output),
            })
        }
    }

    /// Trace the route towards `target`, as a best-effort diagnostic.
    ///
    /// # Errors
    ///
    /// Fails if the target has no address or the binary cannot run;
    /// callers typically log the error instead of aborting.
    pub async fn traceroute(&self, target: &Self) -> GontResult<String> {
        let addr = target.probe_address().ok_or_else(|| GontError::NoAddress {
            node: target.name().to_string(),
        })?;

        let output = self
            .run("traceroute", &["-n", "-w", "1", &addr.to_string()])
            .await?;
        let trace = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(from = self.name(), to = target.name(), %addr, trace = %trace, "Traceroute");
        Ok(trace)
    }
}

fn write_forwarding_sysctls() -> GontResult<()> {
    // /proc/sys/net resolves against the opener's network namespace, so
    // these writes land in the node, not the caller.
    for path in [
        "/proc/sys/net/ipv4/ip_forward",
        "/proc/sys/net/ipv6/conf/all/forwarding",
    ] {
        fs::write(path, "1").map_err(|e| GontError::namespace(format!("write {path}"), e))?;
    }
    Ok(())
}

fn probe_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr.trim();
    if detail.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        detail.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::process::{Command, Stdio};

    #[test]
    fn probe_detail_prefers_stderr() {
        // A real Output is easiest to get from a real process.
        let output = Command::new("sh")
            .args(["-c", "echo out; echo err >&2"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .unwrap();
        assert_eq!(super::probe_detail(&output), "err");
    }
}

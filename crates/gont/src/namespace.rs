#![allow(unsafe_code)]
//! Network namespace handles.
//!
//! A [`Namespace`] binds a symbolic name to an open handle on a kernel
//! network namespace. Named namespaces are bind-mounted under
//! [`NETNS_DIR`] following the `ip netns` convention, so they outlive the
//! creating thread and are discoverable by name for cleanup. Handles are
//! comparable for kernel-level identity via the device and inode of the
//! namespace file.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gont_common::{GontError, GontResult};
use rustix::io::Errno;
use rustix::mount::{UnmountFlags, mount_bind, unmount};
use rustix::thread::{LinkNameSpaceType, UnshareFlags, move_into_link_name_space};

/// Directory where named network namespaces are bind-mounted.
pub const NETNS_DIR: &str = "/var/run/netns";

/// The calling thread's own network namespace in procfs.
const THREAD_NS_NET: &str = "/proc/thread-self/ns/net";

/// Handle on a kernel network namespace.
///
/// Owned handles refer to namespaces this crate created and are removed
/// by [`Namespace::delete`]; the handle returned by [`Namespace::current`]
/// refers to the caller's namespace and is never deleted.
#[derive(Debug)]
pub struct Namespace {
    name: String,
    file: Arc<File>,
    identity: (u64, u64),
    owned: bool,
}

impl Namespace {
    /// Create a named network namespace bind-mounted under [`NETNS_DIR`].
    ///
    /// The calling thread is moved into a fresh namespace just long enough
    /// to bind-mount it and is guaranteed to be back in its original
    /// namespace when this returns, on success and failure alike.
    ///
    /// # Errors
    ///
    /// Fails if the name is unusable, a namespace with this name already
    /// exists, or any of the underlying syscalls fail (all of them require
    /// CAP_NET_ADMIN plus CAP_SYS_ADMIN for the mount).
    pub fn create(name: &str) -> GontResult<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(GontError::InvalidName {
                name: name.to_string(),
            });
        }

        fs::create_dir_all(NETNS_DIR)
            .map_err(|e| GontError::namespace(format!("create {NETNS_DIR}"), e))?;

        let path = Path::new(NETNS_DIR).join(name);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| GontError::namespace(format!("create {}", path.display()), e))?;

        if let Err(e) = Self::bind_current_thread(&path) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        tracing::debug!(name, "Created network namespace");
        Self::open_mounted(name, &path, true)
    }

    /// Unshare the calling thread's network namespace and pin the new one
    /// at `target`, then switch the thread back.
    fn bind_current_thread(target: &Path) -> GontResult<()> {
        let guard = NamespaceGuard::capture()?;

        // Safety: detaching this thread's network namespace is the
        // intended use of unshare; the guard switches the thread back.
        unsafe { rustix::thread::unshare_unsafe(UnshareFlags::NEWNET) }
            .map_err(|e| GontError::namespace("unshare", e.into()))?;

        let mounted = mount_bind(THREAD_NS_NET, target)
            .map_err(|e| GontError::namespace(format!("bind mount {}", target.display()), e.into()));
        guard.exit()?;
        mounted
    }

    /// Bind the calling thread's current network namespace.
    ///
    /// The returned handle carries the symbolic name `base` and is not
    /// owned: deleting it is a no-op. The thread-scoped procfs path keeps
    /// the answer correct even after a per-thread `setns`.
    ///
    /// # Errors
    ///
    /// Fails if the procfs namespace file cannot be opened or stat'ed.
    pub fn current() -> GontResult<Self> {
        let file = File::open(THREAD_NS_NET)
            .map_err(|e| GontError::namespace(format!("open {THREAD_NS_NET}"), e))?;
        let identity = Self::stat_identity(&file)?;
        Ok(Self {
            name: "base".to_string(),
            file: Arc::new(file),
            identity,
            owned: false,
        })
    }

    /// Open a handle on a namespace file at an arbitrary path.
    ///
    /// Used to inspect persisted per-node namespace state; the handle is
    /// not owned.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or stat'ed.
    pub fn open_at(path: &Path, name: &str) -> GontResult<Self> {
        let file = File::open(path)
            .map_err(|e| GontError::namespace(format!("open {}", path.display()), e))?;
        let identity = Self::stat_identity(&file)?;
        Ok(Self {
            name: name.to_string(),
            file: Arc::new(file),
            identity,
            owned: false,
        })
    }

    fn open_mounted(name: &str, path: &Path, owned: bool) -> GontResult<Self> {
        let file = File::open(path)
            .map_err(|e| GontError::namespace(format!("open {}", path.display()), e))?;
        let identity = Self::stat_identity(&file)?;
        Ok(Self {
            name: name.to_string(),
            file: Arc::new(file),
            identity,
            owned,
        })
    }

    fn stat_identity(file: &File) -> GontResult<(u64, u64)> {
        let stat = rustix::fs::fstat(file)
            .map_err(|e| GontError::namespace("stat namespace handle", e.into()))?;
        Ok((stat.st_dev, stat.st_ino))
    }

    /// The symbolic name of this namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the bind mount for named namespaces.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.owned.then(|| Path::new(NETNS_DIR).join(&self.name))
    }

    /// Whether this handle owns (and will delete) the namespace.
    #[must_use]
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Move the calling thread into this namespace until the guard drops.
    ///
    /// The guard restores the previous namespace on every exit path. Do
    /// not hold it across an `.await` point: the task could resume on a
    /// different thread.
    ///
    /// # Errors
    ///
    /// Fails if the current namespace cannot be captured or `setns` is
    /// refused.
    pub fn enter(&self) -> GontResult<NamespaceGuard> {
        NamespaceGuard::enter_file(&self.file)
    }

    /// Clone of the underlying namespace file handle.
    ///
    /// Lets blocking closures enter the namespace without borrowing the
    /// handle; ownership of the namespace itself stays here.
    #[must_use]
    pub(crate) fn file_handle(&self) -> Arc<File> {
        Arc::clone(&self.file)
    }

    /// Raw descriptor for netlink attributes that move links between
    /// namespaces.
    #[must_use]
    pub(crate) fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Open a netlink channel whose socket is bound to this namespace.
    ///
    /// The connection future is spawned onto the current tokio runtime;
    /// abort the returned task when the namespace goes away.
    ///
    /// # Errors
    ///
    /// Fails if the namespace cannot be entered or the socket cannot be
    /// opened.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn netlink(&self) -> GontResult<(tokio::task::JoinHandle<()>, rtnetlink::Handle)> {
        let guard = self.enter()?;
        let conn = rtnetlink::new_connection();
        guard.exit()?;

        let (connection, handle, _) =
            conn.map_err(|e| GontError::netlink("open rtnetlink socket", e))?;
        let task = tokio::spawn(connection);
        Ok((task, handle))
    }

    /// Delete the namespace if this handle owns it.
    ///
    /// An already-absent namespace is success: prior partial cleanup may
    /// have removed it.
    ///
    /// # Errors
    ///
    /// Fails only on unexpected unmount or unlink errors.
    pub fn delete(&self) -> GontResult<()> {
        if !self.owned {
            return Ok(());
        }
        Self::delete_named(&self.name)
    }

    /// Delete a named namespace without holding a handle on it.
    ///
    /// Lazily unmounts and unlinks the bind mount under [`NETNS_DIR`];
    /// absence at either step counts as success.
    ///
    /// # Errors
    ///
    /// Fails only on unexpected unmount or unlink errors.
    pub fn delete_named(name: &str) -> GontResult<()> {
        let path = Path::new(NETNS_DIR).join(name);

        // umount reports EPERM before looking at the path, so answer the
        // already-absent case without a syscall that needs privileges.
        if !path.exists() {
            return Ok(());
        }

        if let Err(errno) = unmount(&path, UnmountFlags::DETACH) {
            if errno != Errno::NOENT && errno != Errno::INVAL {
                return Err(GontError::namespace(
                    format!("unmount {}", path.display()),
                    errno.into(),
                ));
            }
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(name, "Deleted network namespace");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GontError::namespace(format!("remove {}", path.display()), e)),
        }
    }
}

impl PartialEq for Namespace {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Namespace {}

/// Restores the thread's previous network namespace when dropped.
#[must_use]
pub struct NamespaceGuard {
    original: Option<File>,
}

impl NamespaceGuard {
    /// Remember the calling thread's current namespace.
    fn capture() -> GontResult<Self> {
        let original = File::open(THREAD_NS_NET)
            .map_err(|e| GontError::namespace(format!("open {THREAD_NS_NET}"), e))?;
        Ok(Self {
            original: Some(original),
        })
    }

    /// Capture the current namespace, then switch the thread to `file`.
    pub(crate) fn enter_file(file: &File) -> GontResult<Self> {
        let guard = Self::capture()?;
        Self::set(file)?;
        Ok(guard)
    }

    fn set(file: &File) -> GontResult<()> {
        move_into_link_name_space(file.as_fd(), Some(LinkNameSpaceType::Network))
            .map_err(|e| GontError::namespace("setns", e.into()))
    }

    /// Switch back explicitly, surfacing any error.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot re-enter its previous namespace; the
    /// thread must then be considered poisoned for namespace-scoped work.
    pub fn exit(mut self) -> GontResult<()> {
        match self.original.take() {
            Some(file) => Self::set(&file),
            None => Ok(()),
        }
    }
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        if let Some(file) = self.original.take() {
            if let Err(e) = Self::set(&file) {
                tracing::error!(error = %e, "Failed to restore network namespace");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_namespace_identity() {
        let a = Namespace::current().unwrap();
        let b = Namespace::current().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name(), "base");
        assert!(!a.is_owned());
        assert!(a.path().is_none());
    }

    #[test]
    fn delete_absent_is_success() {
        Namespace::delete_named("gont-test-does-not-exist").unwrap();
    }

    #[test]
    fn create_rejects_bad_names() {
        assert!(Namespace::create("").is_err());
        assert!(Namespace::create("a/b").is_err());
    }

    #[test]
    fn unowned_delete_is_noop() {
        let ns = Namespace::current().unwrap();
        ns.delete().unwrap();
        // Still usable afterwards.
        assert_eq!(ns, Namespace::current().unwrap());
    }
}

//! Error types for cellar operations.

/// Alias for `Result<T, cellar::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by cellar lifecycle operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The process does not hold effective root privileges.
    #[error("must run as root (effective gid 0)")]
    NotRoot,

    /// A container id does not refer to a known container directory.
    #[error("unknown container id: {0}")]
    UnknownContainer(String),

    /// An image is still referenced by a container and cannot be removed.
    #[error("image {digest} still in use by container {container}")]
    ImageInUse {
        /// The image digest that was requested for removal.
        digest: String,
        /// The container id holding the reference.
        container: String,
    },

    /// A manifest did not have exactly one entry, or had zero layers.
    #[error("invalid manifest shape: {0}")]
    InvalidManifest(String),

    /// A mount or unmount syscall failed.
    #[error("{op} failed: {source}")]
    Mount {
        /// Short description of the mount operation (e.g. "overlay", "proc").
        op: &'static str,
        /// Underlying nix error.
        source: nix::Error,
    },

    /// A namespace syscall (`clone`, `unshare`, `setns`) failed.
    #[error("{op} failed: {source}")]
    Namespace {
        /// Short description of the namespace operation.
        op: &'static str,
        /// Underlying nix error.
        source: nix::Error,
    },

    /// A cgroup controller file write failed.
    #[error("cgroup write to {path} failed: {source}")]
    Cgroup {
        /// The controller file that was being written.
        path: std::path::PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Invocation of an external `ip` command failed or returned non-zero.
    #[error("`ip {args}` failed: {detail}")]
    Net {
        /// The arguments passed to `ip`.
        args: String,
        /// Human-readable failure detail (exit status or spawn error).
        detail: String,
    },

    /// The OCI image layer for this container could not be resolved.
    #[error(transparent)]
    Oci(#[from] cellar_oci::Error),

    /// Filesystem I/O error not covered by a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<nix::Error> for Error {
    fn from(source: nix::Error) -> Self {
        Self::Namespace {
            op: "syscall",
            source,
        }
    }
}

//! Fixed host filesystem roots under which all engine state lives.
//!
//! None of these paths are configurable — the on-disk layout is part of the
//! engine's contract with itself across re-exec stages, which address state
//! purely by container id and digest rather than by passing paths around.

use std::path::PathBuf;

/// Root for images, pull scratch space, and the name/tag index.
pub const HOME: &str = "/var/lib/go-docker";

/// Root for live container filesystems.
pub const CONTAINERS: &str = "/var/run/go-docker/containers";

/// Root for network namespace bind-mount files.
pub const NETNS: &str = "/var/run/go-docker/net-ns";

/// Fixed engine name segment under each cgroup controller's hierarchy.
pub const CGROUP_ENGINE: &str = "go-docker";

/// `<home>/images`.
pub fn images_dir() -> PathBuf {
    PathBuf::from(HOME).join("images")
}

/// `<home>/tmp/<digest>`.
pub fn tmp_dir(digest: &str) -> PathBuf {
    PathBuf::from(HOME).join("tmp").join(digest)
}

/// `<containers>/<cid>`.
pub fn container_dir(cid: &str) -> PathBuf {
    PathBuf::from(CONTAINERS).join(cid)
}

/// `<containers>/<cid>/fs/mnt` — the overlay mountpoint, i.e. container root.
pub fn container_mnt(cid: &str) -> PathBuf {
    container_dir(cid).join("fs/mnt")
}

/// `<containers>/<cid>/fs/upperdir`.
pub fn container_upper(cid: &str) -> PathBuf {
    container_dir(cid).join("fs/upperdir")
}

/// `<containers>/<cid>/fs/workdir`.
pub fn container_work(cid: &str) -> PathBuf {
    container_dir(cid).join("fs/workdir")
}

/// `<netns>/<cid>`.
pub fn netns_file(cid: &str) -> PathBuf {
    PathBuf::from(NETNS).join(cid)
}

/// `/sys/fs/cgroup/<controller>/go-docker/<cid>`.
pub fn cgroup_dir(controller: &str, cid: &str) -> PathBuf {
    PathBuf::from("/sys/fs/cgroup")
        .join(controller)
        .join(CGROUP_ENGINE)
        .join(cid)
}

/// Creates every top-level directory the engine expects to exist before
/// any operation runs. Idempotent.
pub fn init_dirs() -> std::io::Result<()> {
    for dir in [
        PathBuf::from(HOME),
        images_dir(),
        PathBuf::from(HOME).join("tmp"),
        PathBuf::from(NETNS),
        PathBuf::from(CONTAINERS),
    ] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Returns `true` if the calling process has effective GID 0.
///
/// Matches the source engine's privilege check exactly: it tests the
/// effective group, not the effective user.
pub fn is_root() -> bool {
    nix::unistd::Gid::effective().as_raw() == 0
}

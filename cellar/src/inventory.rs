//! Enumerates running/stopped containers by inspecting cgroup procs, the
//! mount table, and `/proc/<pid>/exe` — without any dedicated state file of
//! its own. The container directory tree and the kernel are the source of
//! truth.

use std::fs;
use std::path::PathBuf;

use crate::error::Result;
use crate::paths;

/// One entry enumerated from `<containers>`.
#[derive(Debug, Clone)]
pub struct Container {
    /// 12-hex-digit container id.
    pub cid: String,
    /// Init PID, if the container is currently active.
    pub pid: Option<i32>,
}

impl Container {
    /// `true` if the container has a live init PID.
    pub fn is_active(&self) -> bool {
        self.pid.is_some()
    }
}

/// Enumerates every container directory under `<containers>`, active or not.
pub fn list() -> Result<Vec<Container>> {
    let root = PathBuf::from(paths::CONTAINERS);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut containers = Vec::new();
    for entry in fs::read_dir(&root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let cid = entry.file_name().to_string_lossy().into_owned();
        let pid = init_pid(&cid);
        containers.push(Container { cid, pid });
    }
    Ok(containers)
}

/// Reads the last line of the cpu controller's `cgroup.procs` for `cid` and
/// parses it as the container's init PID. Returns `None` (inactive) if the
/// file is missing, empty, or its last line fails to parse, and confirms
/// the PID still resolves to a live process under `/proc`.
pub fn init_pid(cid: &str) -> Option<i32> {
    let procs_path = paths::cgroup_dir("cpu", cid).join("cgroup.procs");
    let contents = fs::read_to_string(procs_path).ok()?;
    let last = contents.lines().next_back()?.trim();
    if last.is_empty() {
        return None;
    }
    let pid: i32 = last.parse().ok()?;
    PathBuf::from(format!("/proc/{pid}")).is_dir().then_some(pid)
}

/// Scans `/proc/mounts` for the container's overlay mount, extracts the
/// first `lowerdir=` entry, derives the image digest that layer belongs to
/// (the 12-hex basename of the layer directory's grandparent), and looks
/// that digest up in the image index, returning the indexed `name:tag` if
/// one is still aliased to it. Falls back to the bare digest when the
/// digest's directory survives on disk but every alias has since been
/// removed from the index.
pub fn resolve_image_digest(cid: &str) -> Option<String> {
    let mnt = paths::container_mnt(cid);
    let mnt_str = mnt.to_string_lossy();

    let mounts = fs::read_to_string("/proc/mounts").ok()?;
    let line = mounts.lines().find(|l| l.contains(mnt_str.as_ref()))?;

    let lowerdir = line
        .split_whitespace()
        .nth(3)?
        .split(',')
        .find_map(|opt| opt.strip_prefix("lowerdir="))?;

    let first_layer = lowerdir.split(':').next()?;
    // `<home>/images/<digest>/<lid>/fs` — the digest is two components up
    // from the layer's `fs/` directory.
    let fs_dir = PathBuf::from(first_layer);
    let digest = fs_dir.parent()?.parent()?.file_name()?.to_str()?.to_owned();

    let oci = cellar_oci::Oci::open(std::path::Path::new(paths::HOME)).ok()?;
    match oci.name_for_digest(&digest).ok().flatten() {
        Some(name) => Some(name),
        None => Some(digest),
    }
}

/// Resolves the running command for an active container: reads
/// `/proc/<pid>/exe` and strips the container's mount path prefix.
pub fn resolve_command(cid: &str, pid: i32) -> Option<String> {
    let exe = fs::read_link(format!("/proc/{pid}/exe")).ok()?;
    let mnt = paths::container_mnt(cid).canonicalize().ok()?;
    exe.strip_prefix(&mnt)
        .ok()
        .map(|rel| format!("/{}", rel.display()))
        .or_else(|| Some(exe.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_image_digest_parses_lowerdir_option() {
        let line = "overlay /var/run/go-docker/containers/abcdef012345/fs/mnt overlay rw,lowerdir=/var/lib/go-docker/images/1234567890ab/deadbeefcafe/fs:/var/lib/go-docker/images/1234567890ab/cafebabecafe/fs,upperdir=/x,workdir=/y 0 0";
        let lowerdir = line
            .split_whitespace()
            .nth(3)
            .unwrap()
            .split(',')
            .find_map(|opt| opt.strip_prefix("lowerdir="))
            .unwrap();
        let first_layer = lowerdir.split(':').next().unwrap();
        let fs_dir = PathBuf::from(first_layer);
        let digest = fs_dir.parent().unwrap().parent().unwrap().file_name().unwrap();
        assert_eq!(digest, "1234567890ab");
    }
}

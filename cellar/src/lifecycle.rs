//! The re-exec state machine that drives a container from `inner` entry to
//! teardown, plus the `exec` and `clean` stages. `run`'s top-level
//! orchestration (re-exec spawning and argument marshalling) lives with the
//! CLI, which owns subcommand dispatch; this module owns what each stage
//! actually *does* once invoked.

use std::path::{Path, PathBuf};

use crate::cgroup::{self, Limits};
use crate::error::{Error, Result};
use crate::{netns, paths, sys};

/// Candidate resolver configs, tried in order; the first that exists wins.
const RESOLV_CANDIDATES: &[&str] = &[
    "/var/run/systemd/resolve/resolv.conf",
    "/etc/gockerresolv.conf",
    "/etc/resolv.conf",
];

/// Pseudo-filesystems mounted inside the container, in mount order. Torn
/// down in the reverse of this order.
const MOUNTS: &[(&str, &str)] = &[
    ("proc", "/proc"),
    ("sysfs", "/sys"),
    ("tmpfs", "/tmp"),
    ("tmpfs", "/dev"),
    ("devpts", "/dev/pts"),
];

/// Runs the `inner` stage: the container's own init. Must already be
/// running inside the cloned IPC/mount/PID/UTS namespaces (the network
/// namespace is joined here, by path, since it was created by an earlier
/// stage).
///
/// On return, the user command has exited and every mount made here has
/// been torn down in reverse order.
pub fn inner_stage(
    oci: &cellar_oci::Oci,
    cid: &str,
    digest: &str,
    limits: Limits,
    command: &[String],
) -> Result<i32> {
    sys::sethostname(cid)?;
    join_netns(cid)?;

    cgroup::create(cid, true)?;
    cgroup::apply(cid, limits)?;

    let mnt = paths::container_mnt(cid);
    copy_resolv_conf(&mnt)?;

    sys::chroot_and_enter(&mnt)?;
    mount_all()?;
    netns::bring_up_loopback()?;

    let env = oci.read_env(digest)?;
    let status = spawn_and_wait(command, &env)?;

    unmount_all()?;
    Ok(status)
}

/// `exec` stage: runs an extra process inside an already-running container
/// by joining every namespace of its init PID.
pub fn exec_stage(cid: &str, init_pid: i32, command: &[String]) -> Result<i32> {
    for kind in ["ipc", "mnt", "net", "pid", "uts"] {
        let ns_path = PathBuf::from(format!("/proc/{init_pid}/ns/{kind}"));
        let fd = sys::open_ro(&ns_path)?;
        setns_kind(kind, fd)?;
        sys::close_fd(fd)?;
    }

    cgroup::create(cid, false)?;
    sys::chroot_and_enter(&paths::container_mnt(cid))?;

    let env: Vec<String> = std::env::vars().map(|(k, v)| format!("{k}={v}")).collect();
    let status = spawn_and_wait(command, &env)?;
    Ok(status)
}

/// Tears down a container: unmount the netns bind, unmount the overlay,
/// destroy cgroups, remove the container directory. Order matters — every
/// unmount before any removal, and the netns bind before its own file is
/// removed as part of the directory tree.
pub fn clean(cid: &str) -> Result<()> {
    let dir = paths::container_dir(cid);
    if !dir.exists() {
        return Err(Error::UnknownContainer(cid.to_owned()));
    }

    netns::teardown(cid)?;

    let mnt = paths::container_mnt(cid);
    if mnt.exists() {
        sys::unmount(&mnt)?;
    }

    cgroup::destroy(cid)?;
    std::fs::remove_dir_all(dir)?;
    Ok(())
}

/// Clones a fresh child with new IPC/mount/PID/UTS namespaces (the network
/// namespace is joined later, by path, from inside) and has it re-exec
/// `/proc/self/exe` with `argv` — the mechanism behind spawning the `inner`
/// stage from `run`. Blocks until the child exits and returns its exit code.
pub fn spawn_inner(argv: &[String]) -> Result<i32> {
    use std::ffi::CString;

    let exe = CString::new("/proc/self/exe").map_err(|_| Error::Namespace {
        op: "exec path",
        source: nix::Error::EINVAL,
    })?;
    let cargs: Vec<CString> = argv
        .iter()
        .map(|a| {
            CString::new(a.as_bytes()).map_err(|_| Error::Namespace {
                op: "exec argument",
                source: nix::Error::EINVAL,
            })
        })
        .collect::<Result<_>>()?;

    let mut stack = vec![0_u8; 1024 * 1024];
    let cb = Box::new(move || {
        let err = sys::execv(&exe, &cargs);
        tracing::error!(%err, "inner re-exec failed");
        std::process::exit(127);
    });

    // SAFETY: `cb` execs or exits without returning or unwinding.
    let pid = unsafe { sys::clone_into_container(cb, &mut stack) }?;
    sys::waitpid_exit_code(pid)
}

/// Joins the container's persisted network namespace by path.
fn join_netns(cid: &str) -> Result<()> {
    let ns_path = paths::netns_file(cid);
    let fd = sys::open_ro(&ns_path)?;
    sys::setns_net(fd)?;
    sys::close_fd(fd)
}

/// `setns` dispatch for the five namespace kinds `exec` joins.
fn setns_kind(kind: &str, fd: std::os::fd::RawFd) -> Result<()> {
    use nix::sched::CloneFlags;
    let flag = match kind {
        "ipc" => CloneFlags::CLONE_NEWIPC,
        "mnt" => CloneFlags::CLONE_NEWNS,
        "net" => CloneFlags::CLONE_NEWNET,
        "pid" => CloneFlags::CLONE_NEWPID,
        "uts" => CloneFlags::CLONE_NEWUTS,
        _ => unreachable!("fixed set of namespace kinds"),
    };
    use std::os::fd::BorrowedFd;
    // SAFETY: `fd` was just opened by the caller and is closed right after.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    nix::sched::setns(borrowed, flag).map_err(|source| Error::Namespace {
        op: "setns",
        source,
    })
}

/// Copies the first existing resolver config into the container's
/// `/etc/resolv.conf`. Not finding any candidate is not an error.
fn copy_resolv_conf(container_mnt: &Path) -> Result<()> {
    let Some(source) = RESOLV_CANDIDATES.iter().map(Path::new).find(|p| p.is_file()) else {
        return Ok(());
    };
    let etc = container_mnt.join("etc");
    std::fs::create_dir_all(&etc)?;
    std::fs::copy(source, etc.join("resolv.conf"))?;
    Ok(())
}

/// Mounts every pseudo-filesystem the container needs, creating `/dev/pts`
/// once `/dev` itself is a writable tmpfs.
fn mount_all() -> Result<()> {
    for (fstype, target) in MOUNTS {
        let path = Path::new(target);
        if *target == "/dev/pts" {
            std::fs::create_dir_all(path)?;
        }
        sys::mount_pseudo(fstype, path)?;
    }
    Ok(())
}

/// Unmounts every pseudo-filesystem mounted by [`mount_all`], in reverse
/// order. Each failure is fatal — the caller propagates it and the operator
/// retries with `clean`.
fn unmount_all() -> Result<()> {
    for (_, target) in MOUNTS.iter().rev() {
        sys::unmount(Path::new(target))?;
    }
    Ok(())
}

/// Forks, execs `command` in the child with `env` (plus stdio inherited from
/// the caller), and waits for it, returning its exit code.
fn spawn_and_wait(command: &[String], env: &[String]) -> Result<i32> {
    use std::ffi::CString;

    let to_cstring = |s: &String| {
        CString::new(s.as_bytes()).map_err(|_| Error::Namespace {
            op: "exec argument",
            source: nix::Error::EINVAL,
        })
    };
    let path = to_cstring(&command[0])?;
    let argv: Vec<CString> = command.iter().map(to_cstring).collect::<Result<_>>()?;
    let envp: Vec<CString> = env.iter().map(to_cstring).collect::<Result<_>>()?;

    // SAFETY: single-threaded re-exec helper; the child immediately execs or exits.
    match unsafe { sys::fork() }? {
        nix::unistd::ForkResult::Child => {
            let err = sys::execve(&path, &argv, &envp);
            tracing::error!(%err, command = command[0], "exec failed");
            std::process::exit(127);
        }
        nix::unistd::ForkResult::Parent { child } => sys::waitpid_exit_code(child),
    }
}

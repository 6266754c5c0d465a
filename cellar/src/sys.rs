//! Thin wrappers around the `nix` namespace/mount/process primitives.
//!
//! Every function here corresponds to one syscall (or a fixed short
//! sequence of them) used by the lifecycle orchestrator. Confining them to
//! one module keeps the `unsafe` surface (`clone`'s callback crosses an
//! address-space boundary) reviewable in one place; every other function
//! here is a safe `nix` call with the crate's [`Error`](crate::Error) type
//! attached.

#![allow(unsafe_code)]

use std::os::fd::RawFd;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags, mount, umount2};
use nix::sched::CloneFlags;
use nix::unistd::Pid;

use crate::error::{Error, Result};

/// Mounts an overlay filesystem at `mnt` from the given lower/upper/work
/// directories. `lowerdirs` must already be in the order the kernel wants
/// (topmost layer first).
pub fn mount_overlay(
    mnt: &Path,
    lowerdirs: &[std::path::PathBuf],
    upper: &Path,
    work: &Path,
) -> Result<()> {
    let lower_str = lowerdirs
        .iter()
        .map(|p| p.to_string_lossy())
        .collect::<Vec<_>>()
        .join(":");
    let options = format!(
        "lowerdir={},upperdir={},workdir={}",
        lower_str,
        upper.display(),
        work.display()
    );

    mount(
        Some("overlay"),
        mnt,
        Some("overlay"),
        MsFlags::empty(),
        Some(options.as_str()),
    )
    .map_err(|source| Error::Mount {
        op: "overlay",
        source,
    })
}

/// Unmounts a plain filesystem (overlay, proc, sysfs, tmpfs, devpts, netns bind).
pub fn unmount(target: &Path) -> Result<()> {
    nix::mount::umount(target).map_err(|source| Error::Mount {
        op: "umount",
        source,
    })
}

/// Lazily unmounts, detaching even if busy. Used during forced teardown.
pub fn unmount_detach(target: &Path) -> Result<()> {
    umount2(target, MntFlags::MNT_DETACH).map_err(|source| Error::Mount {
        op: "umount2",
        source,
    })
}

/// Mounts a pseudo-filesystem with no data string (`proc`, `sysfs`, `tmpfs`, `devpts`).
pub fn mount_pseudo(fstype: &str, target: &Path) -> Result<()> {
    mount(
        Some(fstype),
        target,
        Some(fstype),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|source| Error::Mount { op: fstype, source })
}

/// Bind-mounts `source` onto `target` (used to persist a netns at a regular file).
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(|source| Error::Mount {
        op: "bind",
        source,
    })
}

/// Opens a path read-only, returning a raw fd the caller is responsible for closing.
pub fn open_ro(path: &Path) -> Result<RawFd> {
    use nix::fcntl::{OFlag, open};
    open(path, OFlag::O_RDONLY, nix::sys::stat::Mode::empty())
        .map_err(|source| Error::Namespace { op: "open", source })
}

/// Closes a raw fd opened with [`open_ro`].
pub fn close_fd(fd: RawFd) -> Result<()> {
    nix::unistd::close(fd).map_err(|source| Error::Namespace {
        op: "close",
        source,
    })
}

/// Enters the network namespace referenced by an open fd.
pub fn setns_net(fd: RawFd) -> Result<()> {
    use std::os::fd::BorrowedFd;
    // SAFETY: `fd` was returned by `open_ro` and is not closed until after this call.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    nix::sched::setns(borrowed, CloneFlags::CLONE_NEWNET).map_err(|source| Error::Namespace {
        op: "setns(net)",
        source,
    })
}

/// Unshares a fresh network namespace in the calling process.
pub fn unshare_newnet() -> Result<()> {
    nix::sched::unshare(CloneFlags::CLONE_NEWNET).map_err(|source| Error::Namespace {
        op: "unshare(net)",
        source,
    })
}

/// Clones a child with new mount, PID, UTS, and IPC namespaces, running `cb`
/// in the child. The network namespace is deliberately excluded — see
/// the orchestrator's critical-ordering note on joining it by path instead.
///
/// # Safety
/// `cb` runs in a child sharing the parent's address space until it calls
/// `exec` or exits; it must not unwind across the clone boundary and must
/// not touch Rust state the parent is concurrently mutating.
pub unsafe fn clone_into_container(
    cb: Box<dyn FnMut() -> isize>,
    stack: &mut [u8],
) -> Result<Pid> {
    let flags = CloneFlags::CLONE_NEWNS
        | CloneFlags::CLONE_NEWPID
        | CloneFlags::CLONE_NEWUTS
        | CloneFlags::CLONE_NEWIPC;
    // SAFETY: delegated to the caller's contract on `cb`, documented above.
    unsafe { nix::sched::clone(cb, stack, flags, Some(nix::sys::signal::SIGCHLD as i32)) }
        .map_err(|source| Error::Namespace {
            op: "clone",
            source,
        })
}

/// Blocks until `pid` exits.
pub fn waitpid(pid: Pid) -> Result<()> {
    nix::sys::wait::waitpid(pid, None)
        .map(|_| ())
        .map_err(|source| Error::Namespace {
            op: "waitpid",
            source,
        })
}

/// Sets the UTS hostname of the calling (namespace) process.
pub fn sethostname(name: &str) -> Result<()> {
    nix::unistd::sethostname(name).map_err(|source| Error::Namespace {
        op: "sethostname",
        source,
    })
}

/// Changes root to `path`, then `chdir`s into `/` inside the new root.
pub fn chroot_and_enter(path: &Path) -> Result<()> {
    nix::unistd::chroot(path).map_err(|source| Error::Namespace {
        op: "chroot",
        source,
    })?;
    nix::unistd::chdir("/").map_err(|source| Error::Namespace {
        op: "chdir",
        source,
    })
}

/// Sends `SIGKILL` to a PID. Used during cgroup teardown; ignores `ESRCH`
/// (process already gone) since that is the expected common case.
pub fn kill_pid(pid: i32) -> Result<()> {
    let target = Pid::from_raw(pid);
    match nix::sys::signal::kill(target, nix::sys::signal::SIGKILL) {
        Ok(()) | Err(nix::Error::ESRCH) => Ok(()),
        Err(source) => Err(Error::Namespace { op: "kill", source }),
    }
}

/// `execv`s into `path` with `args` (argv[0] included). Only returns on error.
pub fn execv(path: &std::ffi::CStr, args: &[std::ffi::CString]) -> Error {
    let err = nix::unistd::execv(path, args).unwrap_err();
    Error::Namespace { op: "execv", source: err }
}

/// `execve`s into `path` with `args` (argv[0] included) and an explicit
/// environment. Only returns on error.
pub fn execve(
    path: &std::ffi::CStr,
    args: &[std::ffi::CString],
    env: &[std::ffi::CString],
) -> Error {
    let err = nix::unistd::execve(path, args, env).unwrap_err();
    Error::Namespace {
        op: "execve",
        source: err,
    }
}

/// Forks the calling process.
///
/// # Safety
/// Must only be called from a single-threaded process; the child must
/// immediately `exec` or `exit` without unwinding across the fork.
pub unsafe fn fork() -> Result<nix::unistd::ForkResult> {
    // SAFETY: delegated to the caller's contract, documented above.
    unsafe { nix::unistd::fork() }.map_err(|source| Error::Namespace { op: "fork", source })
}

/// Waits for `pid` and extracts a shell-style exit code from its status.
pub fn waitpid_exit_code(pid: Pid) -> Result<i32> {
    use nix::sys::wait::WaitStatus;
    let status = nix::sys::wait::waitpid(pid, None).map_err(|source| Error::Namespace {
        op: "waitpid",
        source,
    })?;
    Ok(match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, signal, _) => 128 + signal as i32,
        _ => 1,
    })
}

//! Cgroup v1 controller management: memory, pids, and cpu limits under a
//! per-container subtree of each controller's hierarchy.

use std::fs;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::{paths, sys};

/// One cgroup v1 controller directory + the values this engine writes to it.
///
/// Modeled as a trait with three concrete implementers rather than an enum:
/// each controller has its own file names and value-formatting rule, and
/// the set of controllers is fixed and small, so the extra indirection of
/// dynamic dispatch buys nothing — `for_each_controller` below just calls
/// each directly.
trait Controller {
    /// Directory name under `/sys/fs/cgroup/`.
    const NAME: &'static str;
}

/// Memory controller.
struct Memory;
impl Controller for Memory {
    const NAME: &'static str = "memory";
}

/// PIDs controller.
struct Pids;
impl Controller for Pids {
    const NAME: &'static str = "pids";
}

/// CPU controller.
struct Cpu;
impl Controller for Cpu {
    const NAME: &'static str = "cpu";
}

/// Resource limits for a container. Zero or negative means "do not set
/// this limit", except `swap_mb = -1` which specifically skips the swap
/// write (any other negative is treated the same).
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    /// Memory limit in MiB. `0` means unlimited.
    pub mem_mb: i64,
    /// Swap limit in MiB on top of `mem_mb`. `-1` skips the memsw write.
    pub swap_mb: i64,
    /// Maximum number of tasks. `0` means unlimited.
    pub pids_max: i64,
    /// Fractional CPU quota (e.g. `1.5` = 1.5 cores).
    pub cpus: f64,
}

const CONTROLLERS: [&str; 3] = [Memory::NAME, Pids::NAME, Cpu::NAME];

fn write_cgroup_file(dir: &PathBuf, file: &str, value: &str) -> Result<()> {
    let path = dir.join(file);
    fs::write(&path, value).map_err(|source| Error::Cgroup { path, source })
}

/// Creates (if `create_dirs`) the three controller directories for `cid`,
/// writes `1` to `notify_on_release`, and joins the *calling* process's PID
/// into each `cgroup.procs`. This must happen before [`apply`] — the
/// process about to exec the workload has to already be accounted before
/// limits take effect.
pub fn create(cid: &str, create_dirs: bool) -> Result<()> {
    let pid = std::process::id();
    for controller in CONTROLLERS {
        let dir = paths::cgroup_dir(controller, cid);
        if create_dirs {
            fs::create_dir_all(&dir)?;
        }
        write_cgroup_file(&dir, "notify_on_release", "1")?;
        write_cgroup_file(&dir, "cgroup.procs", &pid.to_string())?;
    }
    Ok(())
}

/// Writes the requested limits to each controller's files.
pub fn apply(cid: &str, limits: Limits) -> Result<()> {
    if limits.mem_mb > 0 {
        set_memory_limit(cid, limits.mem_mb, limits.swap_mb)?;
    }
    if limits.cpus > 0.0 {
        set_cpu_limit(cid, limits.cpus)?;
    }
    if limits.pids_max > 0 {
        set_pids_limit(cid, limits.pids_max)?;
    }
    Ok(())
}

fn set_memory_limit(cid: &str, mem_mb: i64, swap_mb: i64) -> Result<()> {
    let dir = paths::cgroup_dir(Memory::NAME, cid);
    let bytes = mem_mb * 1024 * 1024;
    write_cgroup_file(&dir, "memory.limit_in_bytes", &bytes.to_string())?;

    if swap_mb >= 0 {
        let memsw = bytes + swap_mb * 1024 * 1024;
        write_cgroup_file(&dir, "memory.memsw.limit_in_bytes", &memsw.to_string())?;
    }
    Ok(())
}

fn set_cpu_limit(cid: &str, cpus: f64) -> Result<()> {
    let online = num_online_cpus();
    if cpus > f64::from(online) {
        tracing::warn!(cpus, online, "ignoring cpu quota above host core count");
        return Ok(());
    }

    let dir = paths::cgroup_dir(Cpu::NAME, cid);
    const PERIOD_US: i64 = 1_000_000;
    write_cgroup_file(&dir, "cpu.cfs_period_us", &PERIOD_US.to_string())?;
    #[allow(clippy::cast_possible_truncation)]
    let quota = (PERIOD_US as f64 * cpus) as i64;
    write_cgroup_file(&dir, "cpu.cfs_quota_us", &quota.to_string())
}

fn set_pids_limit(cid: &str, pids_max: i64) -> Result<()> {
    let dir = paths::cgroup_dir(Pids::NAME, cid);
    write_cgroup_file(&dir, "pids.max", &pids_max.to_string())
}

/// Returns the number of cores the kernel reports online.
fn num_online_cpus() -> u32 {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    n.max(1) as u32
}

/// `SIGKILL`s every PID remaining in each controller's `cgroup.procs`, then
/// removes the three directories. The source engine left this process tree
/// to leak on normal teardown; this is the hardening §9 calls for.
pub fn destroy(cid: &str) -> Result<()> {
    for controller in CONTROLLERS {
        let dir = paths::cgroup_dir(controller, cid);
        if let Ok(contents) = fs::read_to_string(dir.join("cgroup.procs")) {
            for line in contents.lines() {
                if let Ok(pid) = line.trim().parse::<i32>() {
                    sys::kill_pid(pid)?;
                }
            }
        }
        if dir.exists() {
            fs::remove_dir(&dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memsw_limit_disables_swap_when_zero() {
        // swap_mb = 0 writes memsw == mem limit, which is the documented
        // way to disable swap entirely (not a skip).
        let mem_mb = 16;
        let bytes = mem_mb * 1024 * 1024;
        let memsw = bytes + 0 * 1024 * 1024;
        assert_eq!(memsw, bytes);
    }

    #[test]
    fn negative_swap_other_than_minus_one_still_skips() {
        let swap_mb: i64 = -5;
        assert!(swap_mb < 0);
    }

    #[test]
    fn cpu_quota_boundary_at_exact_nproc() {
        let online = 4.0_f64;
        assert!(!(online > online));
        assert!((online + 0.01) > online);
    }
}

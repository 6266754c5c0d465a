//! Network fabric: a persistent host bridge, per-container veth pairs, and
//! the network-namespace plumbing that wires a container's end of the pair
//! into its own, bind-mount-persisted network namespace.
//!
//! Bridge and link manipulation shells out to the host's `ip` utility rather
//! than speaking netlink directly — the same "treat it as an external tool"
//! posture this engine takes toward tar extraction and registry HTTP,
//! without pulling in an async-only netlink crate for a single-threaded,
//! synchronous tool.

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};
use crate::{id, paths, sys};

/// Name of the persistent host bridge.
const BRIDGE: &str = "br0";
/// Bridge IPv4 address and prefix.
const BRIDGE_ADDR: &str = "172.29.0.1/16";
/// Default route pushed into every container namespace.
const GATEWAY: &str = "172.29.0.1";

/// Runs `ip <args>`, mapping a non-zero exit or spawn failure to
/// [`Error::Net`].
fn run_ip(args: &[&str]) -> Result<()> {
    let status = Command::new("ip")
        .args(args)
        .status()
        .map_err(|e| Error::Net {
            args: args.join(" "),
            detail: e.to_string(),
        })?;
    if !status.success() {
        return Err(Error::Net {
            args: args.join(" "),
            detail: format!("exit status {status}"),
        });
    }
    Ok(())
}

/// Returns `true` if a link named `name` exists.
fn link_exists(name: &str) -> bool {
    Command::new("ip")
        .args(["link", "show", name])
        .status()
        .is_ok_and(|s| s.success())
}

/// Ensures the host bridge exists with its fixed address, up. Idempotent by
/// check: a race between two callers may cause a spurious create failure on
/// one side, recovered by the next invocation.
pub fn ensure_bridge() -> Result<()> {
    if link_exists(BRIDGE) {
        return Ok(());
    }
    tracing::debug!(bridge = BRIDGE, "creating host bridge");
    run_ip(&["link", "add", "name", BRIDGE, "type", "bridge"])?;
    run_ip(&["addr", "add", BRIDGE_ADDR, "dev", BRIDGE])?;
    run_ip(&["link", "set", BRIDGE, "up"])
}

/// Host-end and container-end veth device names for a container id.
pub fn veth_names(cid: &str) -> (String, String) {
    let short = id::short6(cid);
    (format!("veth0_{short}"), format!("veth1_{short}"))
}

/// Creates the host-side veth pair and attaches the host end to the bridge.
/// Runs entirely in the host network namespace.
pub fn create_host_veth_pair(cid: &str) -> Result<()> {
    let (host, container) = veth_names(cid);
    tracing::debug!(host, container, "creating veth pair");
    run_ip(&[
        "link", "add", &host, "type", "veth", "peer", "name", &container,
    ])?;
    run_ip(&["link", "set", &host, "master", BRIDGE])?;
    run_ip(&["link", "set", &host, "up"])
}

/// `setup-netns` stage: creates `<netns>/<cid>` as a usable, persisted
/// network namespace.
///
/// Order matters: the new namespace must be unshared in this process
/// *before* the bind mount, or the bind mount captures the (still host)
/// namespace that was current at open time.
pub fn setup_netns(cid: &str) -> Result<()> {
    std::fs::create_dir_all(paths::NETNS)?;
    let target = paths::netns_file(cid);
    std::fs::File::create(&target)?;

    let original = sys::open_ro(Path::new("/proc/self/ns/net"))?;
    sys::unshare_newnet()?;
    sys::bind_mount(Path::new("/proc/self/ns/net"), &target)?;
    sys::setns_net(original)?;
    sys::close_fd(original)?;
    Ok(())
}

/// `setup-veth` stage: moves the container end of the pair into the
/// container's namespace, assigns it a private address, brings it up, and
/// adds a default route via the bridge.
pub fn setup_veth(cid: &str) -> Result<()> {
    let (_, container) = veth_names(cid);
    let ns_path = paths::netns_file(cid);
    let ns_path_str = ns_path.to_string_lossy().into_owned();

    run_ip(&["link", "set", "dev", &container, "netns", &ns_path_str])?;

    let original = sys::open_ro(Path::new("/proc/self/ns/net"))?;
    let ns_fd = sys::open_ro(&ns_path)?;
    sys::setns_net(ns_fd)?;
    sys::close_fd(ns_fd)?;

    let addr = format!("{}/16", container_ip(cid));
    let result = (|| -> Result<()> {
        run_ip(&["addr", "add", &addr, "dev", &container])?;
        run_ip(&["link", "set", &container, "up"])?;
        run_ip(&["route", "add", "default", "via", GATEWAY])
    })();

    sys::setns_net(original)?;
    sys::close_fd(original)?;
    result
}

/// Brings up the loopback interface. Called from inside the container's
/// network namespace (already joined by the time `inner` runs).
pub fn bring_up_loopback() -> Result<()> {
    run_ip(&["addr", "add", "127.0.0.1/32", "dev", "lo"])?;
    run_ip(&["link", "set", "lo", "up"])
}

/// Unmounts the netns bind for `cid`. The namespace itself is released by
/// the kernel once the last reference (this bind, and any process still
/// inside it) is gone.
pub fn teardown(cid: &str) -> Result<()> {
    let target = paths::netns_file(cid);
    if target.exists() {
        sys::unmount(&target)?;
    }
    Ok(())
}

/// Derives a private IPv4 address in `172.29.0.0/16` from the container id,
/// avoiding the bridge's own `172.29.0.1` and the network address `172.29.0.0`.
fn container_ip(cid: &str) -> std::net::Ipv4Addr {
    let bytes = hex::decode(&cid[..cid.len().min(12)]).unwrap_or_default();
    let b2 = bytes.first().copied().unwrap_or(0);
    let mut b3 = bytes.get(1).copied().unwrap_or(1);
    if b2 == 0 && b3 <= 1 {
        b3 = 2;
    }
    std::net::Ipv4Addr::new(172, 29, b2, b3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn veth_names_use_first_six_hex_chars_with_underscore() {
        let (host, container) = veth_names("abcdef012345");
        assert_eq!(host, "veth0_abcdef");
        assert_eq!(container, "veth1_abcdef");
    }

    #[test]
    fn container_ip_stays_in_subnet_and_avoids_gateway() {
        let ip = container_ip("000000012345");
        assert_eq!(ip.octets()[0..2], [172, 29]);
        assert_ne!(ip, std::net::Ipv4Addr::new(172, 29, 0, 1));
        assert_ne!(ip, std::net::Ipv4Addr::new(172, 29, 0, 0));
    }
}

//! Minimal Linux container lifecycle engine: image-backed overlay
//! filesystems, a re-exec state machine that enters kernel namespaces at the
//! correct privilege point, cgroup v1 resource limits, and a veth-bridged
//! network namespace per container.
//!
//! This crate supplies the mechanism — overlay mounts, cgroup writes,
//! namespace syscalls, bridge/veth plumbing, inventory scans. Subcommand
//! dispatch, CLI argument parsing, and the re-exec spawning that ties the
//! stages together into `run` live in the `cellar-cli` binary.

pub mod cgroup;
mod error;
mod id;
pub mod inventory;
mod lifecycle;
pub mod netns;
pub mod overlay;
mod paths;
mod sys;

pub use cgroup::Limits;
pub use error::{Error, Result};
pub use id::{generate_container_id, short6};
pub use lifecycle::{clean, exec_stage, inner_stage, spawn_inner};
pub use paths::{
    CGROUP_ENGINE, CONTAINERS, HOME, NETNS, container_dir, container_mnt, container_upper,
    container_work, images_dir, init_dirs, is_root, netns_file, tmp_dir,
};

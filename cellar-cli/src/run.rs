//! `run`: the top-level orchestration step. Ensures the bridge and image are
//! in place, assembles the overlay, then spawns the `setup-netns` →
//! `setup-veth` → `inner` chain, synchronously, in order.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};

use crate::args::LimitArgs;

/// `run [--mem] [--swap] [--pids] [--cpus] <image[:tag]> <command> [args…]`.
#[derive(clap::Args, Debug)]
#[command(trailing_var_arg = true)]
pub struct RunArgs {
    #[command(flatten)]
    limits: LimitArgs,

    /// Image reference, `name[:tag]` (tag defaults to `latest`).
    image: String,

    /// Command and arguments to run inside the container.
    #[arg(required = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Runs `cellar <args> ...` against `/proc/self/exe` and waits for it to
/// exit successfully. Used for the `setup-netns` and `setup-veth` stages,
/// which manage their own namespace entry and do not need the `inner`
/// stage's `clone`-at-spawn treatment.
fn reexec_wait(args: &[&str]) -> Result<()> {
    let status = Command::new("/proc/self/exe")
        .args(args)
        .status()
        .with_context(|| format!("spawning `{}`", args.join(" ")))?;
    if !status.success() {
        bail!("`{}` exited with {status}", args.join(" "));
    }
    Ok(())
}

/// Flag-style arguments for the shared [`LimitArgs`] shape, in the order
/// `inner` expects to re-parse them.
fn limit_flags(limits: &LimitArgs) -> Vec<String> {
    vec![
        "--mem".to_owned(),
        limits.mem.to_string(),
        "--swap".to_owned(),
        limits.swap.to_string(),
        "--pids".to_owned(),
        limits.pids.to_string(),
        "--cpus".to_owned(),
        limits.cpus.to_string(),
    ]
}

pub fn run(args: RunArgs) -> Result<()> {
    if !cellar::is_root() {
        return Err(cellar::Error::NotRoot.into());
    }
    cellar::init_dirs()?;
    cellar::netns::ensure_bridge()?;

    let oci = cellar_oci::Oci::open(Path::new(cellar::HOME))?;
    tracing::info!(image = args.image, "acquiring image");
    let digest = oci.acquire(&args.image)?;

    let cid = cellar::generate_container_id();
    tracing::info!(cid, digest, "creating container");

    let layer_dirs = oci.layer_dirs_bottom_up(&digest)?;
    cellar::overlay::assemble(&cid, &layer_dirs)?;
    cellar::netns::create_host_veth_pair(&cid)?;

    reexec_wait(&["setup-netns", &cid])?;
    reexec_wait(&["setup-veth", &cid])?;

    let mut inner_argv = vec!["cellar".to_owned(), "inner".to_owned()];
    inner_argv.extend(limit_flags(&args.limits));
    inner_argv.push(digest);
    inner_argv.push(cid);
    inner_argv.extend(args.command);

    tracing::debug!(argv = ?inner_argv, "spawning inner stage");
    let code = cellar::spawn_inner(&inner_argv)?;
    std::process::exit(code);
}

//! `inner`: the container's own init, entered via `clone` into fresh
//! IPC/mount/PID/UTS namespaces. Re-parses the same flag shape `run`
//! marshalled across the re-exec boundary.

use std::path::Path;

use anyhow::Result;

use crate::args::LimitArgs;

/// `inner [--mem] [--swap] [--pids] [--cpus] <digest> <cid> <command> [args…]`.
#[derive(clap::Args, Debug)]
#[command(trailing_var_arg = true)]
pub struct InnerArgs {
    #[command(flatten)]
    limits: LimitArgs,

    /// Image digest, for reading the environment to inject.
    digest: String,

    /// Container id.
    cid: String,

    /// Command and arguments to run inside the container.
    #[arg(required = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

pub fn inner(args: InnerArgs) -> Result<()> {
    let oci = cellar_oci::Oci::open(Path::new(cellar::HOME))?;
    let limits: cellar::Limits = args.limits.into();

    let code = cellar::inner_stage(&oci, &args.cid, &args.digest, limits, &args.command)?;
    std::process::exit(code);
}

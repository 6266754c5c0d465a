//! `exec`: runs an extra process inside an already-running container by
//! joining every namespace of its init PID.

use anyhow::Result;

/// `exec <cid> <command> [args…]`.
#[derive(clap::Args, Debug)]
#[command(trailing_var_arg = true)]
pub struct ExecArgs {
    /// Target container id.
    cid: String,

    /// Command and arguments to run inside the container.
    #[arg(required = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

pub fn exec(args: ExecArgs) -> Result<()> {
    if !cellar::is_root() {
        return Err(cellar::Error::NotRoot.into());
    }

    let pid = cellar::inventory::init_pid(&args.cid)
        .ok_or_else(|| cellar::Error::UnknownContainer(args.cid.clone()))?;

    let code = cellar::exec_stage(&args.cid, pid, &args.command)?;
    std::process::exit(code);
}

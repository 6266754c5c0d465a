//! Shared resource-limit flags.
//!
//! `inner` re-parses the identical flag shape `run` accepts — the wire
//! format the orchestrator marshals across the re-exec boundary is the
//! user-facing flag shape, not a private serialization.

/// `--mem/--swap/--pids/--cpus`, shared by `run` and the internal `inner`
/// re-exec token.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct LimitArgs {
    /// Memory limit in MiB. `0` means unlimited.
    #[arg(long, default_value_t = 0)]
    pub mem: i64,

    /// Swap limit in MiB on top of `--mem`. `-1` skips the swap write.
    #[arg(long, default_value_t = -1)]
    pub swap: i64,

    /// Maximum number of tasks. `0` means unlimited.
    #[arg(long, default_value_t = 0)]
    pub pids: i64,

    /// Fractional CPU quota (e.g. `1.5`). `0` means unlimited.
    #[arg(long, default_value_t = 0.0)]
    pub cpus: f64,
}

impl From<LimitArgs> for cellar::Limits {
    fn from(args: LimitArgs) -> Self {
        Self {
            mem_mb: args.mem,
            swap_mb: args.swap,
            pids_max: args.pids,
            cpus: args.cpus,
        }
    }
}

/// A bare container id, shared by `clean`, `setup-netns`, and `setup-veth`.
#[derive(clap::Args, Debug, Clone)]
pub struct CidArgs {
    /// Container id.
    pub cid: String,
}

/// A bare image digest, used by `rmi`.
#[derive(clap::Args, Debug, Clone)]
pub struct DigestArgs {
    /// Image digest.
    pub digest: String,
}

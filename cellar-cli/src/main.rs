//! CLI for the cellar container lifecycle engine.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod args;
mod exec;
mod images;
mod inner;
mod ps;
mod run;
mod setup;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "cellar", version, about = "Minimal Linux container runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and run a command in a new container.
    Run(Box<run::RunArgs>),

    /// List active containers.
    Ps,

    /// List locally stored images.
    Images,

    /// Run an extra process inside a running container.
    Exec(exec::ExecArgs),

    /// Tear down a container.
    Clean(args::CidArgs),

    /// Remove a locally stored image.
    Rmi(args::DigestArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },

    /// Creates and binds the per-container network namespace. Internal
    /// re-exec token, not for interactive use.
    #[command(hide = true, name = "setup-netns")]
    SetupNetns(args::CidArgs),

    /// Moves the container's veth end into its namespace and addresses it.
    /// Internal re-exec token, not for interactive use.
    #[command(hide = true, name = "setup-veth")]
    SetupVeth(args::CidArgs),

    /// The container's own init, run inside the cloned namespaces. Internal
    /// re-exec token, not for interactive use.
    #[command(hide = true)]
    Inner(Box<inner::InnerArgs>),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = Cli::parse().dispatch() {
        eprintln!("cellar: {e:#}");
        std::process::exit(1);
    }
}

impl Cli {
    fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Run(args) => run::run(*args),
            Command::Ps => ps::ps(),
            Command::Images => images::images(),
            Command::Exec(args) => exec::exec(args),
            Command::Clean(args) => clean(&args.cid),
            Command::Rmi(args) => rmi(&args.digest),
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "cellar", &mut std::io::stdout());
                Ok(())
            }
            Command::SetupNetns(args) => setup::setup_netns(&args.cid),
            Command::SetupVeth(args) => setup::setup_veth(&args.cid),
            Command::Inner(args) => inner::inner(*args),
        }
    }
}

fn clean(cid: &str) -> Result<()> {
    require_root()?;
    cellar::clean(cid)?;
    Ok(())
}

fn rmi(digest: &str) -> Result<()> {
    require_root()?;
    for container in cellar::inventory::list()? {
        if !container.is_active() {
            continue;
        }
        if cellar::inventory::resolve_image_digest(&container.cid).as_deref() == Some(digest) {
            return Err(cellar::Error::ImageInUse {
                digest: digest.to_owned(),
                container: container.cid,
            }
            .into());
        }
    }
    let oci = cellar_oci::Oci::open(std::path::Path::new(cellar::HOME))?;
    oci.remove(digest)?;
    Ok(())
}

/// Fails fast with [`cellar::Error::NotRoot`] when not running with
/// effective GID 0, per the spec's blanket privilege requirement.
pub(crate) fn require_root() -> Result<()> {
    if !cellar::is_root() {
        return Err(cellar::Error::NotRoot.into());
    }
    Ok(())
}

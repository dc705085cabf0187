use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Parser, Debug)]
pub enum Command {
    /// Provision the target device: partition, encrypt, build volumes,
    /// install and configure the system. Destroys everything on the device.
    #[command(name = "provision")]
    Provision(ProvisionOptions),

    /// Show the computed partition, volume and mount plan without touching
    /// anything.
    #[command(name = "plan")]
    Plan(PlanOptions),

    /// Best-effort release of everything a previous run may have left
    /// behind (mounts, swap, volume group, mapper), so it can be retried.
    #[command(name = "teardown")]
    Teardown(TeardownOptions),

    /// Print an annotated example config file.
    #[command(name = "template")]
    Template,
}

#[derive(Parser, Debug)]
pub struct ProvisionOptions {
    /// Path to the installation config file.
    #[clap(long, short = 'c')]
    pub config: PathBuf,

    /// Skip the destructive-write confirmation prompt.
    #[clap(long, short = 'y', default_value = "false")]
    pub yes: bool,

    /// Read the LUKS passphrase from this file instead of prompting.
    #[clap(long)]
    pub passphrase_file: Option<PathBuf>,

    /// Read the user password from this file instead of prompting.
    #[clap(long)]
    pub password_file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct PlanOptions {
    /// Path to the installation config file.
    #[clap(long, short = 'c')]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct TeardownOptions {
    /// Path to the installation config file.
    #[clap(long, short = 'c')]
    pub config: PathBuf,
}

//! Clap derive structures for the `connectd` daemon.

use std::path::PathBuf;

use clap::Parser;

/// connectd -- headless speaker that other devices on the account can control
#[derive(Debug, Parser)]
#[command(
    name = "connectd",
    version,
    about = "Run a headless connect device session",
    long_about = "Authenticates with the backend, registers this machine as a \
        controllable device and stays online until interrupted.\n\n\
        Profiles are read from config.toml in the platform config directory \
        and may be overridden with CONNECTD_* environment variables."
)]
pub struct Cli {
    /// Config file to read instead of the platform default
    #[arg(long, short = 'c', env = "CONNECTD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device profile to use
    #[arg(long, short = 'p', env = "CONNECTD_PROFILE")]
    pub profile: Option<String>,

    /// Validate the configuration and exit without connecting
    #[arg(long)]
    pub check: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

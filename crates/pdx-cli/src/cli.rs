use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pdx",
    about = "Private data exchange: request/response over a shared ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a two-participant exchange over an in-memory ledger
    Demo(DemoArgs),
    /// Validate an exchange configuration file
    CheckConfig(CheckConfigArgs),
}

#[derive(Args)]
pub struct DemoArgs {
    /// Number of requests the first participant submits
    #[arg(long, default_value_t = 3)]
    pub requests: usize,
    /// Retention of request payloads, in days
    #[arg(long, default_value_t = 2)]
    pub ttl_days: u32,
    /// Requesting participant
    #[arg(long, default_value = "Org1MSP")]
    pub requester: String,
    /// Responding participant
    #[arg(long, default_value = "Org2MSP")]
    pub responder: String,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Path to a TOML configuration file
    pub path: PathBuf,
}

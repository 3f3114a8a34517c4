//! # CLI Interface
//!
//! `clap` derive definitions for `lendvault-node`: `run`, `init`, `status`
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// LendVault devnet node.
///
/// Hosts a single vault in-process and serves its operations over HTTP,
/// JSON-RPC and WebSocket, with Prometheus metrics on a separate port.
#[derive(Parser, Debug)]
#[command(
    name = "lendvault-node",
    about = "LendVault devnet node",
    version,
    propagate_version = true
)]
pub struct LendVaultCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy the vault and serve the API.
    Run(RunArgs),
    /// Write a default config file.
    Init(InitArgs),
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for `run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the node config (TOML). Built-in devnet defaults when omitted.
    #[arg(long, short = 'c', env = "LENDVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interface to bind both listeners on.
    #[arg(long, env = "LENDVAULT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the REST, JSON-RPC and WebSocket API.
    #[arg(long, env = "LENDVAULT_RPC_PORT", default_value_t = 9751)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "LENDVAULT_METRICS_PORT", default_value_t = 9752)]
    pub metrics_port: u16,

    /// Log output format.
    #[arg(long, env = "LENDVAULT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Arguments for `init`.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the config.
    #[arg(long, short = 'o', default_value = "lendvault.toml")]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for `status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// `host:port` of the running node's API.
    #[arg(long, default_value = "127.0.0.1:9751")]
    pub rpc_addr: String,
}

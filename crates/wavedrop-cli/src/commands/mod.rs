//! CLI command definitions and handlers.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod cleanup;
pub mod receive;
pub mod relay;
pub mod send;

/// Load configuration with graceful fallback to defaults.
pub fn load_config() -> wavedrop_core::config::Config {
    wavedrop_core::config::Config::load().unwrap_or_default()
}

/// Wavedrop - relay-signaled peer-to-peer file transfer
#[derive(Parser)]
#[command(name = "wavedrop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Share a file and print its token
    Send(SendArgs),

    /// Receive a file using a share token
    Receive(ReceiveArgs),

    /// Run a relay
    Relay(RelayArgs),

    /// Sweep expired sessions on a relay
    Cleanup(CleanupArgs),
}

/// Arguments for the send command.
#[derive(Debug, clap::Args)]
pub struct SendArgs {
    /// Path of the file to share
    pub file: PathBuf,

    /// Relay base URL (defaults to the configured relay)
    #[arg(long)]
    pub relay: Option<String>,

    /// Suppress decorative output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the receive command.
#[derive(Debug, clap::Args)]
pub struct ReceiveArgs {
    /// The share token
    pub token: String,

    /// Directory to save the received file into
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Relay base URL (defaults to the configured relay)
    #[arg(long)]
    pub relay: Option<String>,

    /// Suppress decorative output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the relay command.
#[derive(Debug, clap::Args)]
pub struct RelayArgs {
    /// Address to bind (defaults to the configured bind address)
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Bearer secret protecting the cleanup endpoint
    #[arg(long)]
    pub cleanup_secret: Option<String>,

    /// Seconds between background expiry sweeps
    #[arg(long, default_value_t = 60)]
    pub sweep_interval: u64,
}

/// Arguments for the cleanup command.
#[derive(Debug, clap::Args)]
pub struct CleanupArgs {
    /// Relay base URL (defaults to the configured relay)
    #[arg(long)]
    pub relay: Option<String>,

    /// Bearer secret, if the relay requires one
    #[arg(long)]
    pub secret: Option<String>,
}

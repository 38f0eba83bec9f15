//! Wavedrop CLI - relay-signaled peer-to-peer file transfer
//!
//! A lightweight relay brokers the connection setup; the file itself
//! travels directly between the two peers.
//!
//! ## Quick Start
//!
//! ```bash
//! # Start a relay (or point both peers at a shared one)
//! wavedrop relay
//!
//! # Share a file
//! wavedrop send ./document.pdf
//!
//! # Receive it (on another machine)
//! wavedrop receive mapleforest
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Relay(args) => commands::relay::run(args).await,
        Command::Cleanup(args) => commands::cleanup::run(args).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,wavedrop=info,wavedrop_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

//! ## flowkeep-cli
//! **Replay segment traces into flow records**
//!
//! `flowkeep replay` feeds each trace file through a fresh connection pool,
//! writes full payloads to the blob directory and completed records as
//! JSON lines. `flowkeep check-config` prints the effective configuration.

use clap::Parser;

mod commands;
mod error;
mod runtime;
mod trace;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}

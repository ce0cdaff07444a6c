//! macroharvest CLI: collect macro-bearing Office documents from a URL list.
//!
//! Fetches every candidate, keeps only document containers that carry a
//! macro, and stores each new sample once in a content-addressed directory.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

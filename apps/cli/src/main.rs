//! SiteFilter CLI — curated domain registry maintenance.
//!
//! Harvests candidate domains from web search and merges them into the
//! accepted-site registry, skipping known, covered and blacklisted domains.

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

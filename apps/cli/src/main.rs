//! SiteForge CLI — AI-driven website generation and editing.
//!
//! Triggers checkpointed generation runs, inspects their progress, applies
//! validated patch edits to blueprints, and deploys ready versions.

mod cms;
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

//! postrelay CLI: webhook-triggered social publishing for a news site.
//!
//! Receives "article published" webhooks from the CMS, renders a branded
//! creative, uploads it and posts it to the configured social accounts.

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

//! contentmirror CLI — local mirror of a remote content repository.
//!
//! Materializes a repository's documents into a local database, keeps
//! the mirror reconciled against change notifications, and drives the
//! one-shot preview bootstrap.

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

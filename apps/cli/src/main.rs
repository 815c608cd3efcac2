//! Marginalia CLI: move Kobo highlights and notes into a Hardcover reading
//! journal.
//!
//! Reads annotations off the device database into a local JSON store, then
//! syncs every pending record to the catalog exactly once.

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

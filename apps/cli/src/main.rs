//! Semantic asset harvester CLI.
//!
//! Harvests ontologies and controlled vocabularies from public
//! administration repositories into a SPARQL triple store and a local
//! search index.

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

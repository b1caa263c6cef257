//! WebResolve CLI: answer a question from the web with a single best answer.
//!
//! Optimizes the question into a search query, evaluates the top results
//! with a language model, and prints the most confident answer.

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

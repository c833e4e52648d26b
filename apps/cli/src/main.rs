//! LiveCourses CLI: live training course search.
//!
//! Scrapes a course listing through an extraction provider, enriches the
//! top results with detail pages, and prints one JSON result envelope.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    let code = commands::run(cli).await?;
    std::process::exit(code);
}

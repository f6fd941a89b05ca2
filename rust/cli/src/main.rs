use clap::Parser;
use eyre::Result;

mod cli;
mod display;
mod logging;

use crate::cli::Cli;

/// Main entry function
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::setup(cli.log_level, &cli.log_filter, cli.log_format)?;

    cli.run().await
}

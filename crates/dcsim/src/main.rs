//! Drive the display core through JSON scenarios on simulated hardware.

use anyhow::Result;
use clap::Parser;

mod app;
mod cli;
mod logger;
mod scenario;

fn main() -> Result<()> {
    let cli = crate::cli::Cli::parse();
    logger::init(cli.level());
    crate::app::run(cli)
}

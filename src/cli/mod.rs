//! Command-line interface for the DKG operator tool.
//!
//! - [`commands`]: clap argument definitions
//! - [`handlers`]: one handler per command
//! - [`output`]: sentinel-prefixed line output and JSON file I/O

pub mod commands;
mod handlers;
pub mod output;

use clap::Parser;
use commands::Cli;

/// Parse arguments and dispatch to the matching handler.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    handlers::execute(cli.command)
}

//! Shim binary that calls into the helper library's `inner_main`.
use clap::Parser as _;
use eyre::Result;

use gracedown_helper::cli::Cli;

fn main() -> Result<()> {
    // Delegate to library entrypoint
    gracedown_helper::inner_main(Cli::parse())
}

//! Binary entry for the helper: parses the CLI and delegates to the library.

use clap::Parser as _;

use gracedown_helper::cli::Cli;

fn main() -> eyre::Result<()> {
    gracedown_helper::inner_main(Cli::parse())
}

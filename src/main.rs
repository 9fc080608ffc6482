use anyhow::Result;
use clap::Parser;

use multi_lookup::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run()
}

//! disksense CLI: scan a directory into the index, then find and (if allowed) remove
//! duplicate files.

use anyhow::Result;
use clap::Parser;
use disksense::engine::{Cli, handle_run};
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    disksense::utils::setup_logging(cli.verbose);
    handle_run(cli.command)?;

    log::debug!("total time: {:?}", start_time.elapsed());
    Ok(())
}

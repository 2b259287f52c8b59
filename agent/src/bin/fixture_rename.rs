use std::path::PathBuf;

use clap::Parser;
use log::{info, LevelFilter};

use agent::fixture::{self, DEFAULT_PREFIX};
use agent::logging;

/// Normalises copied fixture directories before the integration tests run.
#[derive(Debug, Parser)]
#[command(name = "fixture-rename", version)]
struct Args {
    /// Directory holding the fixture directories.
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Name prefix shared by the fixture and its copies.
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.log_level)?;

    let report = fixture::run(&fixture::Options {
        root: args.root,
        prefix: args.prefix,
    })?;
    for (from, to) in &report.renamed {
        info!("renamed {} -> {}", from.display(), to.display());
    }
    for file in &report.rewritten {
        info!("rewrote {}", file.display());
    }
    Ok(())
}

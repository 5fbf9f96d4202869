//! Thin CLI driving the motion core over a flat file of moves.
//!
//! Not a full printer host: no gcode dialect, no serial transport to
//! real hardware, no temperature control (see SPEC_FULL.md §1). It
//! exists to demonstrate and integration-test the planner/segq/
//! itersolve/stepcompress pipeline end to end, printing the MCU commands
//! it would send as hex-encoded `mcu-proto` frames.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

mod config;
mod moves;
mod pipeline;

use config::MotionConfig;

/// Drive the motion core over a flat move file and print the resulting
/// MCU command frames.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML motion configuration (steppers, planner, MCU clock).
    #[arg(short, long, default_value = "motion.toml")]
    config: PathBuf,

    /// Path to the flat move file (`x y z e [feedrate]` per line).
    #[arg(short, long)]
    moves: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    info!("loading configuration from {:?}", cli.config);
    let config = MotionConfig::load(&cli.config).context("loading motion configuration")?;

    info!("loading moves from {:?}", cli.moves);
    let targets = moves::load_moves(&cli.moves).context("loading move file")?;
    info!("{} moves loaded", targets.len());

    pipeline::run(&config, &targets)
}

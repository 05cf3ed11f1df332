#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the gazetteer index-build pipeline.
//!
//! Two stages, run in order:
//!
//! - `slice`: read upstream feature tuples (JSON lines) and partition
//!   them into 0.1° stripe files under the data directory.
//! - `join`: resolve every address point against its enclosing street
//!   and city polygons and emit joined records to stdout or a file.
//!
//! Logging goes through `pretty_env_logger`; set `RUST_LOG` to tune it.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use gazetteer_join::{JoinConfig, Joiner, PrintJoinOutHandler};
use gazetteer_model::AddrLevelsSorting;
use gazetteer_striper::slicer::slice_reader;
use gazetteer_striper::store::StripeStore;

#[derive(Parser)]
#[command(name = "gazetteer", about = "Build a searchable geographic index from map extracts")]
struct Cli {
    /// Folder used as stripe data storage
    #[arg(long, default_value = "slices")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition upstream feature tuples into stripe files
    Slice {
        /// Path to the newline-delimited feature tuple file
        input: PathBuf,
        /// Stripe grid step in degrees
        #[arg(long, default_value_t = gazetteer_model::DEFAULT_GRID_STEP)]
        grid_step: f64,
    },
    /// Spatially join address points against boundary polygons
    Join {
        /// How to sort address levels in the rendered text
        #[arg(long, default_value = "HN_STREET_CITY")]
        addr_order: AddrLevelsSorting,
        /// Output file for joined records (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Worker thread count (0 = available parallelism; 1 gives a
        /// stable total output order)
        #[arg(long, default_value_t = 0)]
        threads: usize,
        /// Stripe grid step in degrees (must match the slice stage)
        #[arg(long, default_value_t = gazetteer_model::DEFAULT_GRID_STEP)]
        grid_step: f64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Slice { input, grid_step } => {
            let store = StripeStore::new(&cli.data_dir, grid_step)?;
            let reader = BufReader::new(File::open(&input)?);

            log::info!("slicing {} into {}", input.display(), cli.data_dir.display());
            let stats = slice_reader(reader, &store)?;
            log::info!("slice done: {} written, {} skipped", stats.written, stats.skipped);
        }
        Commands::Join {
            addr_order,
            out,
            threads,
            grid_step,
        } => {
            let store = StripeStore::new(&cli.data_dir, grid_step)?;

            let options: Vec<String> = out
                .into_iter()
                .map(|p| p.display().to_string())
                .collect();
            let sink = PrintJoinOutHandler::from_options(&options)?;

            let joiner = Joiner::new(
                &store,
                JoinConfig {
                    sorting: addr_order,
                    threads,
                },
            );
            let stats = joiner.run(&sink)?;
            log::info!(
                "join done: {} records over {} stripes ({} skipped)",
                stats.joined,
                stats.stripes,
                stats.skipped
            );
        }
    }

    Ok(())
}

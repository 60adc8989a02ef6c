// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "snapshot-pipeline")]
#[command(about = "Capture and persist photos through the snapshot pipeline")]
#[command(version = env!("PIPELINE_BUILD_VERSION"))]
struct Cli {
    /// Config file (default: ~/.config/snapshot-pipeline/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a burst of photos with the virtual camera
    Burst {
        /// Number of photos to take
        #[arg(short = 'n', long, default_value = "5")]
        count: u32,

        /// Exposure compensation step (-4..=4)
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        exposure: i32,

        /// Output directory (default: ~/Pictures/camera)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run the auto-enhance step on every shot
        #[arg(long)]
        enhance: bool,
    },

    /// Record a short synthetic clip through the video path
    Video {
        /// Clip duration in seconds
        #[arg(short, long, default_value = "2")]
        duration: u64,

        /// Output directory (default: ~/Pictures/camera)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List catalog entries
    Catalog {
        /// Media directory (default: ~/Pictures/camera)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=snapshot_pipeline=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Burst {
            count,
            exposure,
            output,
            enhance,
        } => cli::burst(config, count, exposure, output, enhance),
        Commands::Video { duration, output } => cli::record_video(config, duration, output),
        Commands::Catalog { output } => cli::list_catalog(config, output),
        Commands::Config => cli::print_config(&config),
    }
}

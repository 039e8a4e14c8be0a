// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use mediadriver::config::Config;
use mediadriver::constants::{DEFAULT_LOG_FILTER, DEFAULT_RECORD_COUNT};
use mediadriver::driver::DeviceType;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "mediadriver")]
#[command(about = "Inspect and record from capture devices")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered devices, best priority first
    List {
        /// Only show devices of this type (camera, microphone, screen)
        #[arg(short, long)]
        kind: Option<DeviceType>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the label of the default device of a type
    Default {
        kind: DeviceType,
    },

    /// Open a device, print its properties and close it
    Probe {
        label: String,
    },

    /// Record frames or chunks from a device
    Record {
        label: String,

        /// Number of frames or chunks to read
        #[arg(short, long, default_value_t = DEFAULT_RECORD_COUNT)]
        count: usize,

        /// Requested frame width
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Requested frame height
        #[arg(long, requires = "width")]
        height: Option<u32>,
    },

    /// Show the effective configuration
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load before logging is set up so log_filter can apply
    let config_result = Config::load();
    let log_filter = config_result
        .as_ref()
        .ok()
        .and_then(|config| config.log_filter.clone())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    // RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&log_filter))
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config = match config_result {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load configuration, using defaults");
            Config::default()
        }
    };

    match cli.command {
        Commands::List { kind, json } => cli::list_devices(&config, kind, json),
        Commands::Default { kind } => cli::default_device(&config, kind),
        Commands::Probe { label } => cli::probe_device(&config, &label),
        Commands::Record {
            label,
            count,
            width,
            height,
        } => cli::record(&config, &label, count, width.zip(height)),
        Commands::Config { path } => cli::show_config(&config, path),
    }
}

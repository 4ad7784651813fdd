//! PointLayer CLI
//!
//! Loads tiles from a point-cloud service through the tile cache and converts
//! coordinates between UTM and longitude/latitude.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pointlayer::logging::{init_logging, LogConfig};

use commands::config::ConfigCommands;
use commands::geodetic::GeodeticCommands;
use commands::load::LoadArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "pointlayer", version = pointlayer::VERSION, about)]
struct Cli {
    /// Config file (defaults to ~/.pointlayer/config.ini when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write rotated log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load the tiles covering a world-space box
    Load(LoadArgs),

    /// Convert coordinates
    #[command(subcommand)]
    Geodetic(GeodeticCommands),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let log_config = LogConfig::default()
        .with_level(level)
        .with_directory(cli.log_dir.clone());
    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Load(args) => commands::load::run(args, config_path).await,
        Commands::Geodetic(command) => commands::geodetic::run(command),
        Commands::Config(command) => commands::config::run(command, config_path),
    }
}

//! DocVault CLI
//!
//! Command-line tools for DocVault store administration.
//!
//! # Commands
//!
//! - `stats` - Display collection counts, sizes and cache settings
//! - `validate` - Check document ids against file names, optionally repair
//! - `backup` - Copy the store into a backup set
//! - `restore` - Replace the store with a backup set
//! - `clear-cache` - Drop cached data
//! - `version` - Show version information

mod commands;
mod settings;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DocVault command-line store tools.
#[derive(Parser)]
#[command(name = "docvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// JSON config file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Hex-encoded 32-byte encryption key
    #[arg(global = true, long, env = "DOCVAULT_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check that every document's id matches its file name
    Validate {
        /// Rewrite mismatched ids to match the file name
        #[arg(long)]
        fix: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Back up the data (and assets) directory
    Backup {
        /// Backup directory (default: ./backups/backup-<timestamp>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore the store from a backup directory
    Restore {
        /// Backup directory to restore from
        source: PathBuf,

        /// Overwrite existing data without asking
        #[arg(short, long)]
        force: bool,
    },

    /// Clear cached data
    ClearCache,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("DocVault CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("DocVault Core v{}", docvault_core::VERSION);
        return Ok(());
    }

    let config = settings::resolve(cli.config.as_deref(), cli.path, cli.key.as_deref())?;

    match cli.command {
        Commands::Stats { format } => commands::stats::run(config, format)?,
        Commands::Validate { fix, format } => commands::validate::run(&config, fix, format)?,
        Commands::Backup { output } => commands::backup::create(&config, output.as_deref())?,
        Commands::Restore { source, force } => commands::backup::restore(&config, &source, force)?,
        Commands::ClearCache => commands::clear_cache::run(config)?,
        Commands::Version => {}
    }

    Ok(())
}

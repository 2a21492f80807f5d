//! Command-line interface for digestcast

mod commands;

pub use commands::*;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// digestcast - Turn a day of newsletters into a chaptered podcast
///
/// Collects newsletters from Gmail, summarizes and narrates them with OpenAI
/// and publishes the episode to Azure Blob Storage.
#[derive(Parser, Debug)]
#[command(name = "digestcast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "DIGESTCAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of threads for content extraction (default: number of CPUs)
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Produce and publish today's episode now
    Run(RunArgs),

    /// Produce an episode every day at the configured time
    Schedule(ScheduleArgs),

    /// Authorize Gmail access and store the token
    Auth(AuthArgs),

    /// Print the article text extracted from a saved newsletter
    Extract(ExtractArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Remove leftover temporary files
    Clean(CleanArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Search this many days back instead of the configured value
    #[arg(short, long)]
    pub days_ago: Option<u32>,

    /// Copy the finished episode into this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip the Azure upload; requires --output-dir
    #[arg(long, requires = "output_dir")]
    pub no_upload: bool,
}

/// Arguments for the schedule command
#[derive(Parser, Debug, Clone)]
pub struct ScheduleArgs {
    /// Daily run time in UTC as HH:MM (default: from configuration)
    #[arg(short, long)]
    pub at: Option<String>,

    /// Run once immediately before waiting for the first scheduled time
    #[arg(long)]
    pub run_on_startup: bool,
}

/// Arguments for the auth command
#[derive(Parser, Debug, Clone)]
pub struct AuthArgs {
    /// OAuth client secrets file (default: from configuration)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Where to write the token (default: from configuration)
    #[arg(long)]
    pub token: Option<PathBuf>,

    /// Loopback port for the redirect (default: from configuration)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Replace an existing token without asking
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the extract command
#[derive(Parser, Debug, Clone)]
pub struct ExtractArgs {
    /// Saved newsletter body (.html, .htm or plain text)
    #[arg(required = true)]
    pub input: PathBuf,

    /// Print word count and length instead of the text
    #[arg(short, long)]
    pub stats: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Reset configuration to defaults
    Reset,
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },
    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Initialize configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
    /// List required settings that are missing
    Check,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Dry run - show what would be deleted
    #[arg(short, long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

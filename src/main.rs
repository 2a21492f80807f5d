//! digestcast - Turn a day of newsletters into a chaptered podcast
//!
//! Main entry point for the digestcast CLI application.

use std::process::ExitCode;

use console::style;
use tracing_subscriber::EnvFilter;

use digestcast::cli::{self, Cli, Commands};
use digestcast::config::Config;
use digestcast::error::Result;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    dotenvy::dotenv().ok();

    // Set up logging
    setup_logging(&cli);

    // Run the application
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Map the level names accepted in settings onto tracing's
fn tracing_level(name: &str) -> &'static str {
    match name.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        _ => "info",
    }
}

/// Set up logging based on CLI arguments, then `RUST_LOG`, then the
/// configured level
fn setup_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        let configured = std::env::var("LOG_LEVEL").ok().or_else(|| {
            let path = cli.config.clone().or_else(|| Config::config_path().ok())?;
            Config::load_from(&path).ok().map(|c| c.logging.level)
        });
        tracing_level(configured.as_deref().unwrap_or("info"))
    };

    let filter = if cli.verbose || cli.quiet {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main application logic
async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Config(args) => return cli::execute_config(args, cli.config.as_deref()).await,
        Commands::Extract(args) => return cli::execute_extract(args).await,
        _ => {}
    }

    let config = Config::load_layered(cli.config.as_deref())?;

    // Set number of parallel jobs
    if let Some(jobs) = cli.jobs.or(config.general.jobs) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .ok();
    }

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Run(args) => cli::execute_run(&args, &config).await,
        Commands::Schedule(args) => cli::execute_schedule(&args, &config).await,
        Commands::Auth(args) => cli::execute_auth(&args, &config).await,
        Commands::Clean(args) => cli::execute_clean(&args, &config).await,
        Commands::Config(_) | Commands::Extract(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level() {
        assert_eq!(tracing_level("INFO"), "info");
        assert_eq!(tracing_level("WARNING"), "warn");
        assert_eq!(tracing_level("critical"), "error");
        assert_eq!(tracing_level(" Debug "), "debug");
        assert_eq!(tracing_level("verbose"), "info");
    }
}

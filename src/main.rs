//! imgcache - reference-counted disk cache for remote images
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use imgcache::cli::{Cli, Commands};
use imgcache::config::ConfigManager;
use imgcache::error::CacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("imgcache=warn"),
        1 => EnvFilter::new("imgcache=info"),
        _ => EnvFilter::new("imgcache=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init();
    }

    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Fetch(args) => imgcache::cli::commands::fetch(args, &config).await,
        Commands::List(args) => imgcache::cli::commands::list(args, &config).await,
        Commands::Stats => imgcache::cli::commands::stats(&config).await,
        Commands::Clear(args) => imgcache::cli::commands::clear(args, &config).await,
        Commands::Reconcile(args) => imgcache::cli::commands::reconcile(args, &config).await,
        Commands::Config(args) => {
            imgcache::cli::commands::config(args, &config_manager, &config).await
        }
    }
}

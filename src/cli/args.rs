//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// imgcache - reference-counted disk cache for remote images
///
/// Downloads images into a size-bounded cache directory and shares one
/// file between every cache id that points at the same URL.
#[derive(Parser, Debug)]
#[command(name = "imgcache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "IMGCACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load an image into the cache under a cache id
    Fetch(FetchArgs),

    /// List cached entries and their cache ids
    List(ListArgs),

    /// Show usage against the configured budget
    Stats,

    /// Remove every cached file and record
    Clear(ClearArgs),

    /// Repair records and files against each other
    Reconcile(ReconcileArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the fetch command
#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Cache id the image is requested under
    pub key: String,

    /// Image URL
    pub url: String,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Arguments for the reconcile command
#[derive(Parser, Debug)]
pub struct ReconcileArgs {
    /// Report what would change without touching anything
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_fetch() {
        let cli = Cli::parse_from(["imgcache", "fetch", "avatar-7", "https://cdn.example/a.png"]);
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.key, "avatar-7");
                assert_eq!(args.url, "https://cdn.example/a.png");
            }
            _ => panic!("expected Fetch command"),
        }
    }

    #[test]
    fn cli_fetch_requires_url() {
        assert!(Cli::try_parse_from(["imgcache", "fetch", "avatar-7"]).is_err());
    }

    #[test]
    fn cli_parses_list_format() {
        let cli = Cli::parse_from(["imgcache", "list", "--format", "json"]);
        match cli.command {
            Commands::List(args) => assert!(matches!(args.format, OutputFormat::Json)),
            _ => panic!("expected List command"),
        }
    }

    #[test]
    fn cli_parses_clear_yes() {
        let cli = Cli::parse_from(["imgcache", "clear", "-y"]);
        match cli.command {
            Commands::Clear(args) => assert!(args.yes),
            _ => panic!("expected Clear command"),
        }
    }

    #[test]
    fn cli_parses_reconcile_dry_run() {
        let cli = Cli::parse_from(["imgcache", "reconcile", "--dry-run"]);
        match cli.command {
            Commands::Reconcile(args) => assert!(args.dry_run),
            _ => panic!("expected Reconcile command"),
        }
    }

    #[test]
    fn cli_parses_config_init_force() {
        let cli = Cli::parse_from(["imgcache", "config", "init", "--force"]);
        match cli.command {
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Init { force }),
            }) => assert!(force),
            _ => panic!("expected Config Init command"),
        }
    }

    #[test]
    fn cli_counts_verbosity() {
        let cli = Cli::parse_from(["imgcache", "-vv", "stats"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Stats));
    }
}

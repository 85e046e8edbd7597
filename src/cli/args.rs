//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Semantic File Search sync agent
#[derive(Parser, Debug)]
#[command(
    name = "sfs",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch directories and sync changed files to a Semantic File Search API",
    long_about = "Watch directories and sync changed files to a Semantic File Search API.\n\n\
                  Configuration lives in <config dir>/sfs/config.toml and can be \
                  overridden with SFS_* environment variables.",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to a custom config.toml file
    #[arg(short, long, global = true, env = "SFS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync daemon in the foreground
    Run,

    /// Manage directories watched by the daemon
    Watch {
        #[command(subcommand)]
        action: WatchAction,
    },

    /// Show or change configuration values
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Semantic search over indexed files
    #[command(after_help = "Examples:\n  sfs search \"machine learning algorithms\"\n  sfs search deploy steps --limit 10 --threshold 0.7")]
    Search {
        /// Search query (multiple words are joined with spaces)
        #[arg(required = true)]
        query: Vec<String>,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Minimum similarity score (0.0-1.0)
        #[arg(short, long, default_value_t = 0.5)]
        threshold: f64,
    },

    /// List indexed files
    List {
        /// Only show files whose stored name starts with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Download a stored file
    Download {
        /// Stored file name, as shown by `sfs list`
        name: String,

        /// Destination path (defaults to the stored name)
        output: Option<PathBuf>,

        /// Destination path, alternative to the positional form
        #[arg(short = 'o', long = "output", conflicts_with = "output")]
        output_flag: Option<PathBuf>,
    },

    /// Delete a stored file and its index data
    Delete {
        /// Stored file name, as shown by `sfs list`
        name: String,
    },

    /// Upload a single file right away
    Upload {
        /// File to upload
        file: PathBuf,

        /// Replace the existing entry for this file on the server
        #[arg(short, long)]
        update: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum WatchAction {
    /// Add a directory to watch (including its subdirectories)
    Add {
        /// Directory to add
        directory: PathBuf,
    },

    /// Remove a directory from the watch list
    Remove {
        /// Directory to remove
        directory: PathBuf,
    },

    /// List watched directories
    List,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (API key masked)
    Show,

    /// Print a single value
    Get {
        /// One of: api_url, api_key, debounce_ms, on_shutdown
        key: String,
    },

    /// Set a single value and save
    Set {
        /// One of: api_url, api_key, debounce_ms, on_shutdown
        key: String,
        /// New value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_add_with_global_config() {
        let cli = Cli::try_parse_from(["sfs", "watch", "add", "/data", "--config", "/tmp/c.toml"])
            .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        match cli.command {
            Commands::Watch {
                action: WatchAction::Add { directory },
            } => assert_eq!(directory, PathBuf::from("/data")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_search_joins_words() {
        let cli = Cli::try_parse_from(["sfs", "search", "deploy", "steps", "-l", "10"]).unwrap();
        match cli.command {
            Commands::Search {
                query,
                limit,
                threshold,
            } => {
                assert_eq!(query.join(" "), "deploy steps");
                assert_eq!(limit, 10);
                assert_eq!(threshold, 0.5);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_download_output_forms_conflict() {
        assert!(Cli::try_parse_from(["sfs", "download", "a.txt", "out.txt"]).is_ok());
        assert!(Cli::try_parse_from(["sfs", "download", "a.txt", "-o", "out.txt"]).is_ok());
        assert!(Cli::try_parse_from(["sfs", "download", "a.txt", "x", "-o", "y"]).is_err());
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::try_parse_from(["sfs", "config", "set", "debounce_ms", "250"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Set { ref key, ref value }
            } if key == "debounce_ms" && value == "250"
        ));
    }
}

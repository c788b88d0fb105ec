//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Discover and extract entities from an entity-oriented HTTP API
#[derive(Parser, Debug)]
#[command(name = "entity-tap")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tap configuration file (YAML or JSON)
    #[arg(short, long, global = true, default_value = "tap.yaml")]
    pub config: PathBuf,

    /// Bookmark file; overrides `state_path` from the config
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Test connection to the API
    Check,

    /// Discover entities and print their schemas
    Discover,

    /// Sync records of the selected entities
    Read {
        /// Entities to sync (comma-separated glob patterns, empty = config selection)
        #[arg(long)]
        entities: Option<String>,

        /// Number of entities synced at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Force a replication mode for every entity
        #[arg(long)]
        mode: Option<ModeArg>,
    },

    /// List entity names (no schemas)
    Entities,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}

/// Replication mode given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// Re-read everything
    FullTable,
    /// Continue from the stored bookmark
    Incremental,
}

impl From<ModeArg> for crate::types::SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::FullTable => Self::FullTable,
            ModeArg::Incremental => Self::Incremental,
        }
    }
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
    fn test_parse_read() {
        let cli = Cli::parse_from([
            "entity-tap",
            "-c",
            "api.yaml",
            "read",
            "--entities",
            "inv*,order",
            "--mode",
            "incremental",
            "--state",
            "state.json",
        ]);

        assert_eq!(cli.config, PathBuf::from("api.yaml"));
        assert_eq!(cli.state, Some(PathBuf::from("state.json")));
        match cli.command {
            Commands::Read {
                entities,
                concurrency,
                mode,
            } => {
                assert_eq!(entities.as_deref(), Some("inv*,order"));
                assert_eq!(concurrency, None);
                assert_eq!(mode, Some(ModeArg::Incremental));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["entity-tap", "entities"]);
        assert_eq!(cli.config, PathBuf::from("tap.yaml"));
        assert!(!cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
    }
}

//! CLI module
//!
//! Command-line interface for running the tap.
//!
//! # Commands
//!
//! - `check` - Test connection to the API
//! - `discover` - Print entities with their JSON schemas
//! - `read` - Sync records, bookmarks and a final report
//! - `entities` - List entity names (lightweight)

mod commands;
mod runner;

pub use commands::{Cli, Commands, ModeArg, OutputFormat};
pub use runner::Runner;

//! CLI type definitions
//!
//! Clap command structures for the `dynacache` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::inspect::InspectArgs;
use crate::cli::commands::notify::NotifyArgs;
use crate::cli::commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "dynacache")]
#[command(about = "Configuration-aware cache for dynamically built agents and tools", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .dynacache/
    #[arg(short, long, global = true, env = "DYNACACHE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the cache service with its change listener until Ctrl-C
    Run(RunArgs),

    /// Resolve active entities through the cache and show their fingerprints
    Inspect(InspectArgs),

    /// Publish a change event on the notification channel
    Notify(NotifyArgs),

    /// Print the effective configuration
    Config,
}

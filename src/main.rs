//! Dynacache CLI entry point.

use anyhow::Result;
use clap::Parser;

use dynacache::cli::{commands, handle_error, Cli, Commands};
use dynacache::infrastructure::logging::LoggerImpl;
use dynacache::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _logger = LoggerImpl::init(&config.logging)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, cli.json).await,
        Commands::Inspect(args) => commands::inspect::execute(args, &config, cli.json).await,
        Commands::Notify(args) => commands::notify::execute(args, &config, cli.json).await,
        Commands::Config => commands::config::execute(&config, cli.json),
    }
}

use crate::config::AppConfig;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line entry point.
#[derive(Parser, Debug)]
#[command(author, version, about = "Local hybrid code search", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (overrides the XDG default)
    #[arg(long = "config", global = true, env = "CODEQUERY_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Index directory (overrides config & default)
    #[arg(long = "index-root", global = true, env = "CODEQUERY_INDEX_ROOT")]
    pub index_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index files or directories into both indexes
    Index(super::index::IndexArgs),
    /// Search the indexes
    Query(super::query::QueryArgs),
    /// Watch directories and keep the indexes current
    Watch(super::watch::WatchArgs),
    /// Serve requests over stdio (line JSON or JSON-RPC)
    Serve(super::serve::ServeArgs),
    /// Show index statistics
    Stats(super::stats::StatsArgs),
    /// Delete the on-disk index state
    Clear(super::clear::ClearArgs),
    /// Show how a query would be executed
    Explain(super::explain::ExplainArgs),
}

/// Applies global overrides and dispatches to the handler.
pub fn handle_command(args: CliArgs, mut config: AppConfig) -> Result<()> {
    if let Some(root) = &args.index_root {
        config.index_root = Some(root.clone());
    }
    match args.command {
        Commands::Index(index_args) => super::index::handle(index_args, config),
        Commands::Query(query_args) => super::query::handle(query_args, config),
        Commands::Watch(watch_args) => super::watch::handle(watch_args, config),
        Commands::Serve(serve_args) => super::serve::handle(serve_args, config),
        Commands::Stats(stats_args) => super::stats::handle(stats_args, config),
        Commands::Clear(clear_args) => super::clear::handle(clear_args, config),
        Commands::Explain(explain_args) => super::explain::handle(explain_args, config),
    }
}

use crate::config::AppConfig;
use crate::error::Result;
use crate::service::SearchService;
use crate::types::{CancelToken, SearchFilters, SearchRequest};
use clap::Args;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// The search query
    pub query: String,

    /// Maximum number of results
    #[arg(long, short = 'k', default_value_t = crate::constants::DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Restrict to one language
    #[arg(long, short = 'l')]
    pub language: Option<String>,

    /// File patterns to filter by (repeatable, e.g. "*.go")
    #[arg(long = "pattern", short = 'p')]
    pub file_patterns: Vec<String>,

    /// Restrict to repository path prefixes (repeatable)
    #[arg(long = "repo")]
    pub repos: Vec<String>,

    /// Emit the raw JSON response instead of formatted output
    #[arg(long)]
    pub json: bool,
}

pub fn handle(args: QueryArgs, config: AppConfig) -> Result<()> {
    let service = Arc::new(SearchService::open(config)?);
    let request = SearchRequest {
        query: args.query,
        top_k: args.top_k,
        language: args.language,
        filters: SearchFilters {
            file_patterns: args.file_patterns,
            repos: args.repos,
        },
    };
    let response = service.search(&request, &CancelToken::new())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        super::formatters::print_response(&response);
    }
    Ok(())
}

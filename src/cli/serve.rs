use crate::config::AppConfig;
use crate::error::Result;
use crate::server;
use crate::service::SearchService;
use crate::types::CancelToken;
use clap::Args;
use log::info;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Skip the embedder warmup (first query pays the cost instead)
    #[arg(long)]
    pub no_warmup: bool,
}

pub fn handle(args: ServeArgs, config: AppConfig) -> Result<()> {
    let service = Arc::new(SearchService::open(config)?);
    if !args.no_warmup {
        service.warmup()?;
    }
    let token = CancelToken::new();
    let ctrlc_token = token.clone();
    ctrlc::set_handler(move || ctrlc_token.cancel())
        .map_err(|e| crate::error::Error::Internal(format!("signal handler: {}", e)))?;

    info!("Serving on stdio");
    server::run_stdio(Arc::clone(&service), token)?;
    service.close()
}

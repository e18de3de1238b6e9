use crate::config::AppConfig;
use crate::error::Result;
use crate::ingest::watcher;
use crate::service::SearchService;
use crate::types::CancelToken;
use clap::Args;
use colored::Colorize;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directories to watch
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Index everything once before watching
    #[arg(long)]
    pub full: bool,
}

pub fn handle(args: WatchArgs, config: AppConfig) -> Result<()> {
    let service = Arc::new(SearchService::open(config.clone())?);
    service.warmup()?;
    let token = CancelToken::new();
    let repository = args
        .paths
        .first()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let coordinator = service.new_coordinator(repository, token.clone());

    if args.full {
        let files = super::index::collect_files(&args.paths, &config, &[]);
        println!("Initial index of {} files...", files.len());
        coordinator.bulk_index(&files, |_, _| {})?;
        service.save()?;
    }

    let handle = watcher::watch(
        &args.paths,
        Arc::clone(&coordinator),
        config.watcher.debounce_ms,
        token.clone(),
    )?;

    println!(
        "{} {} (ctrl-c to stop)",
        "Watching".green().bold(),
        args.paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let ctrlc_token = token.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        ctrlc_token.cancel();
    })
    .map_err(|e| crate::error::Error::Internal(format!("signal handler: {}", e)))?;

    // Sleep until cancelled; the watcher and workers do the work.
    while !token.is_cancelled() {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
    handle.stop();
    service.save()?;
    println!("{}", "Stopped.".dimmed());
    Ok(())
}

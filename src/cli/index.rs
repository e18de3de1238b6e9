use crate::config::AppConfig;
use crate::constants::MAX_FILE_SIZE_BYTES;
use crate::error::Result;
use crate::lexical::detect_language;
use crate::service::SearchService;
use crate::types::CancelToken;
use clap::Args;
use colored::Colorize;
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Files or directories to index
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Only index files of these languages (repeatable)
    #[arg(long = "language", short = 'l')]
    pub languages: Vec<String>,

    /// Suppress the progress bar
    #[arg(long)]
    pub quiet: bool,
}

/// Directories never worth indexing.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "dist",
    "build",
    ".venv",
    "__pycache__",
];

/// Walks the given roots and collects indexable files.
pub fn collect_files(paths: &[PathBuf], config: &AppConfig, languages: &[String]) -> Vec<PathBuf> {
    let repo_globs: Vec<Pattern> = config
        .repo_globs
        .iter()
        .filter_map(|g| Pattern::new(g).ok())
        .collect();

    let mut files = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(e.file_type().is_dir()
                    && (SKIP_DIRS.contains(&name.as_ref()) || name.starts_with('.')))
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if entry
                .metadata()
                .map(|m| m.len() > MAX_FILE_SIZE_BYTES)
                .unwrap_or(true)
            {
                debug!("Skipping oversized or unreadable {}", path.display());
                continue;
            }
            if !repo_globs.is_empty() && !repo_globs.iter().any(|g| g.matches_path(path)) {
                continue;
            }
            let language = detect_language(path);
            if !languages.is_empty() && !languages.iter().any(|l| l.eq_ignore_ascii_case(&language))
            {
                continue;
            }
            if !config.languages.is_empty()
                && !config
                    .languages
                    .iter()
                    .any(|l| l.eq_ignore_ascii_case(&language))
            {
                continue;
            }
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files.dedup();
    files
}

pub fn handle(args: IndexArgs, config: AppConfig) -> Result<()> {
    let service = Arc::new(SearchService::open(config.clone())?);
    service.warmup()?;
    let token = CancelToken::new();
    let coordinator = service.new_coordinator(display_root(&args.paths), token.clone());

    let files = collect_files(&args.paths, &config, &args.languages);
    if files.is_empty() {
        println!("{}", "No indexable files found.".yellow());
        return Ok(());
    }
    println!("Indexing {} files...", files.len());

    let bar = if args.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(files.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    };

    let indexed = coordinator.bulk_index(&files, |done, _total| {
        bar.set_position(done as u64);
    })?;
    bar.finish_and_clear();

    service.save()?;
    let status = coordinator.status();
    println!(
        "{} {} of {} files ({} failed)",
        "Indexed".green().bold(),
        indexed,
        files.len(),
        status.failed_files.len()
    );
    for failed in status.failed_files.iter().take(10) {
        println!("  {} {}", "failed:".red(), failed);
    }
    Ok(())
}

fn display_root(paths: &[PathBuf]) -> String {
    match paths {
        [single] => single.to_string_lossy().into_owned(),
        _ => format!("{} roots", paths.len()),
    }
}

use crate::config::AppConfig;
use crate::constants::{LEXICAL_SHARD_FILE, VECTOR_FILE};
use crate::error::Result;
use clap::Args;
use colored::Colorize;
use log::info;
use std::fs;

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn handle(args: ClearArgs, config: AppConfig) -> Result<()> {
    let root = config.index_root()?;
    if !root.exists() {
        println!("{}", "Nothing to clear.".dimmed());
        return Ok(());
    }
    if !args.yes {
        println!("Delete index state under {}? [y/N]", root.display());
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("{}", "Aborted.".dimmed());
            return Ok(());
        }
    }

    let mut removed = 0usize;
    for name in [
        LEXICAL_SHARD_FILE.to_string(),
        VECTOR_FILE.to_string(),
        format!("{}.meta", VECTOR_FILE),
    ] {
        let path = root.join(&name);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Removed {}", path.display());
            removed += 1;
        }
    }
    println!("{} {} index files", "Removed".green().bold(), removed);
    Ok(())
}

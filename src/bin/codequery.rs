use clap::Parser;
use colored::Colorize;
use log::debug;
use std::process::exit;

use codequery_lib::cli::{self, CliArgs};
use codequery_lib::config;

fn main() {
    env_logger::init();
    let args = CliArgs::parse();

    let config = match config::load_config(args.config_path.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            exit(e.exit_code());
        }
    };
    debug!("Configuration loaded");

    if let Err(e) = cli::handle_command(args, config) {
        eprintln!("{} {}", "error:".red().bold(), e);
        exit(e.exit_code());
    }
}

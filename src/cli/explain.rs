use crate::config::AppConfig;
use crate::error::Result;
use crate::service::SearchService;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct ExplainArgs {
    /// The query to explain
    pub query: String,

    /// Emit JSON instead of formatted output
    #[arg(long)]
    pub json: bool,
}

pub fn handle(args: ExplainArgs, config: AppConfig) -> Result<()> {
    let service = SearchService::open(config)?;
    let explanation = service.explain(&args.query);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
        return Ok(());
    }
    println!("{} {:?}", "query:".bold(), explanation.original);
    println!(
        "{} {}",
        "keywords:".bold(),
        explanation.extracted_keywords.join(", ")
    );
    println!("{} {}", "regex:".bold(), explanation.is_regex);
    println!("{} {}", "strategy:".bold(), explanation.strategy_label);
    println!("{} {:.2}", "bm25 weight:".bold(), explanation.bm25_weight);
    Ok(())
}

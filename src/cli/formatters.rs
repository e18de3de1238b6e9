//! Human-readable result formatting for the terminal.

use crate::types::{HitSource, SearchResponse};
use colored::Colorize;

pub fn print_response(response: &SearchResponse) {
    if let Some(warning) = &response.warning {
        println!("{} {}", "warning:".yellow().bold(), warning);
    }
    if response.hits.is_empty() {
        println!("{}", "No results.".dimmed());
        return;
    }
    for (i, hit) in response.hits.iter().enumerate() {
        let location = if hit.line_number > 0 {
            format!("{}:{}", hit.file, hit.line_number)
        } else {
            hit.file.clone()
        };
        let source = match hit.source {
            HitSource::Lexical => "lex".blue(),
            HitSource::Semantic => "sem".magenta(),
            HitSource::Both => "both".green(),
        };
        println!(
            "{:>2}. {} {} {}",
            i + 1,
            location.cyan().bold(),
            format!("[{:.3}]", hit.score).dimmed(),
            source
        );
        let text = hit.text.trim();
        if !text.is_empty() {
            // First line only; chunks can be long.
            let first_line = text.lines().next().unwrap_or("");
            println!("    {}", first_line);
        }
    }
    println!(
        "{}",
        format!(
            "{} hits ({} lexical, {} semantic candidates) in {:.1} ms",
            response.total_hits,
            response.lexical_hits,
            response.semantic_hits,
            response.query_time_ns as f64 / 1e6
        )
        .dimmed()
    );
}

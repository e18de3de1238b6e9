use crate::config::AppConfig;
use crate::error::Result;
use crate::service::SearchService;
use clap::Args;
use colored::Colorize;

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Emit JSON instead of formatted output
    #[arg(long)]
    pub json: bool,
}

pub fn handle(args: StatsArgs, config: AppConfig) -> Result<()> {
    let service = SearchService::open(config)?;
    let lexical = service.lexical_handle().stats()?;
    let vectors = service.vector_handle().stats()?;
    let status = service.index_status();

    if args.json {
        let body = serde_json::json!({
            "lexical": {
                "total_docs": lexical.total_docs,
                "unique_terms": lexical.unique_terms,
                "total_terms": lexical.total_terms,
                "avg_doc_length": lexical.avg_doc_length,
                "last_index_time": lexical.last_index_time,
                "state": lexical.state,
            },
            "vector": {
                "total_vectors": vectors.total_vectors,
                "dimension": vectors.dimension,
                "metric": vectors.metric,
            },
            "status": status,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("{}", "Lexical index".bold());
    println!("  documents:      {}", lexical.total_docs);
    println!("  unique terms:   {}", lexical.unique_terms);
    println!("  total terms:    {}", lexical.total_terms);
    println!("  avg doc length: {:.1}", lexical.avg_doc_length);
    println!("  state:          {}", lexical.state);
    if let Some(t) = lexical.last_index_time {
        println!("  last indexed:   {}", t.to_rfc3339());
    }
    println!("{}", "Vector index".bold());
    println!("  vectors:        {}", vectors.total_vectors);
    println!("  dimension:      {}", vectors.dimension);
    println!("  metric:         {}", vectors.metric);
    println!("{}", "Index root".bold());
    println!("  {}", service.index_root().display());
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use ragweave::app::{init_logging, RagApp};
use ragweave::{Config, DocumentStore, StoredObject};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "search")]
#[command(about = "Query the chunk collection (semantic by default, keyword with --bm25)")]
struct Args {
    /// Query text
    query: String,

    /// Number of hits to return
    #[arg(short, long, default_value_t = 3)]
    k: usize,

    /// Also return chunks within this distance of each hit (semantic search only)
    #[arg(short, long, default_value_t = 1)]
    neighbors: usize,

    /// Keyword (BM25) search instead of semantic search
    #[arg(long)]
    bm25: bool,

    /// Class to search with --bm25 (defaults to the chunk class)
    #[arg(long)]
    class: Option<String>,

    /// Property to search with --bm25; repeatable
    #[arg(long = "property", default_values_t = vec!["text".to_string()])]
    properties: Vec<String>,
}

fn print_results(query: &str, results: &[StoredObject]) {
    println!("\nQuery: \"{}\"\n", query);
    if results.is_empty() {
        println!("No results found.");
        return;
    }
    for result in results {
        println!("─────────────────────────────────────────────────────────────────────────────");
        let source = result.source().unwrap_or("?");
        match (result.chunk_id(), result.additional.score, result.additional.distance) {
            (Some(chunk_id), Some(score), _) => println!("{} #{} (score: {:.3})", source, chunk_id, score),
            (Some(chunk_id), None, Some(distance)) => {
                println!("{} #{} (distance: {:.3})", source, chunk_id, distance)
            }
            (Some(chunk_id), None, None) => println!("{} #{} (neighbor)", source, chunk_id),
            (None, _, _) => println!("{} [{}]", source, result.id),
        }
        if let Some(text) = result.text() {
            // preview on a char boundary
            let preview: String = text.chars().take(200).collect();
            let ellipsis = if text.chars().count() > 200 { "..." } else { "" };
            println!("\n{}{}\n", preview, ellipsis);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.query.trim().is_empty() {
        anyhow::bail!("Query cannot be empty");
    }

    let config = Config::load()?;
    init_logging(&config.ragweave.log_level);
    let app = RagApp::new(config)?;
    let chunk_class = app.config.weaviate.chunk_class.clone();

    let start = Instant::now();
    let results = if args.bm25 {
        let class = args.class.as_deref().unwrap_or(&chunk_class);
        let properties: Vec<&str> = args.properties.iter().map(String::as_str).collect();
        app.store.search_bm25(class, &args.query, &properties, args.k).await?
    } else {
        app.store
            .search_near_text(&chunk_class, &args.query, args.k, args.neighbors)
            .await?
    };
    let duration = start.elapsed();

    print_results(&args.query, &results);
    println!("Found {} result(s) in {:.0}ms", results.len(), duration.as_secs_f64() * 1000.0);

    Ok(())
}

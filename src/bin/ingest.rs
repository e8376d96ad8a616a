use anyhow::Result;
use clap::Parser;
use ragweave::app::{init_logging, RagApp};
use ragweave::ingest::{ErrorPolicy, IngestOptions};
use ragweave::Config;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Ingest files into Weaviate (skips files whose size and mtime are unchanged)")]
struct Args {
    /// File or directory to ingest
    path: PathBuf,

    /// Descend into directories
    #[arg(short, long)]
    recursive: bool,

    /// Re-ingest files even when they are unchanged
    #[arg(short, long)]
    force: bool,

    /// Keep going when a file fails instead of stopping at the first error
    #[arg(short, long)]
    keep_going: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load()?;
    init_logging(&config.ragweave.log_level);

    log::info!("Starting RAGWeave ingestion");
    let app = RagApp::new(config)?;
    // extraction/OAuth settings are checked here, before any traversal
    let reconciler = app.reconciler()?;

    let options = IngestOptions {
        recursive: args.recursive,
        force: args.force,
        on_error: if args.keep_going {
            ErrorPolicy::Continue
        } else {
            ErrorPolicy::Abort
        },
    };
    if options.force {
        log::info!("Mode: full re-ingestion");
    }

    let start = Instant::now();
    let report = reconciler.ingest_path(&args.path, &options).await?;
    log::info!("Time: {:.1}s", start.elapsed().as_secs_f64());

    if !report.failed.is_empty() {
        for (path, error) in &report.failed {
            log::error!("Failed: {}: {}", path.display(), error);
        }
        anyhow::bail!("{} file(s) failed to ingest", report.failed.len());
    }

    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use ragweave::app::{init_logging, RagApp};
use ragweave::chat::is_exit_command;
use ragweave::ingest::resolve_source;
use ragweave::models::{Document, Record};
use ragweave::store::{schema, DocumentStore, DEFAULT_LIST_LIMIT};
use ragweave::{Config, RagweaveError};
use std::io::{BufRead, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ragweave", version)]
#[command(about = "RAGWeave - documents in Weaviate, schema management, chat and query API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or manage the Weaviate schema
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
    /// List ingested documents
    Documents,
    /// Delete a document and all of its chunks
    Delete {
        /// Source path (need not exist on disk any more)
        path: PathBuf,
    },
    /// Interactive chat grounded on the ingested documents
    Chat {
        #[arg(short, long)]
        k: Option<usize>,
        #[arg(short, long)]
        neighbors: Option<usize>,
    },
    /// Serve the HTTP query API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaAction {
    /// Print the full schema
    Get,
    /// Create the document and chunk classes if missing
    Apply,
    /// Print one class definition
    Class { class: String },
    /// Delete a class and all of its objects
    Delete { class: String },
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    init_logging(&config.ragweave.log_level);
    let app = RagApp::new(config)?;

    match cli.command {
        Command::Schema { action } => run_schema(&app, action).await?,
        Command::Documents => {
            let collections = app.collections();
            let documents = app
                .store
                .list(&collections.documents, Document::PROPERTIES, DEFAULT_LIST_LIMIT)
                .await?;
            print_json(&documents)?;
            log::info!("{} document(s)", documents.len());
        }
        Command::Delete { path } => {
            let source = resolve_source(&path);
            let deleted = app.delete_source(&source).await?;
            println!(
                "Deleted {} document(s) and {} chunk(s) for {}",
                deleted.documents.successful, deleted.chunks.successful, source
            );
            if deleted.documents.failed + deleted.chunks.failed > 0 {
                anyhow::bail!(
                    "{} deletion(s) failed",
                    deleted.documents.failed + deleted.chunks.failed
                );
            }
        }
        Command::Chat { k, neighbors } => {
            let k = k.unwrap_or(app.config.chat.k);
            let neighbors = neighbors.unwrap_or(app.config.chat.neighbors);
            run_chat(&app, k, neighbors).await?;
        }
        Command::Serve { port } => {
            log::info!("Starting RAGWeave HTTP Server v{}", env!("CARGO_PKG_VERSION"));
            let port = port.unwrap_or(app.config.http_server.port);
            app.query_server()?.run(port).await?;
        }
    }

    Ok(())
}

async fn run_schema(app: &RagApp, action: SchemaAction) -> Result<()> {
    match action {
        SchemaAction::Get => print_json(&app.store.get_schema().await?)?,
        SchemaAction::Apply => {
            let created = schema::ensure_schema(&app.store, &app.config.weaviate).await?;
            if created.is_empty() {
                println!("Schema already up to date");
            } else {
                println!("Created: {}", created.join(", "));
            }
        }
        SchemaAction::Class { class } => match app.store.get_class(&class).await {
            Ok(definition) => print_json(&definition)?,
            Err(RagweaveError::ClassNotFound(_)) => anyhow::bail!("class {} not found", class),
            Err(e) => return Err(e.into()),
        },
        SchemaAction::Delete { class } => {
            app.store.delete_class(&class).await?;
            println!("Deleted class {}", class);
        }
    }
    Ok(())
}

async fn run_chat(app: &RagApp, k: usize, neighbors: usize) -> Result<()> {
    let mut session = app.chat_session(k, neighbors)?;

    println!("Chat started (type exit or quit to leave)");
    println!("Start a question with !norag to skip document retrieval");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!(">> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if is_exit_command(&line) {
            break;
        }

        match session.ask(&line).await {
            Ok(reply) => {
                println!("{}", reply.answer.trim());
                if !reply.sources.is_empty() {
                    println!("\nSources:");
                    for (i, hit) in reply.sources.iter().take(2).enumerate() {
                        let preview: String = hit.text().unwrap_or("").chars().take(100).collect();
                        println!("{}. {} - {}...", i + 1, hit.source().unwrap_or("?"), preview);
                    }
                }
            }
            Err(e) => log::error!("{}", e),
        }
    }

    println!("Chat ended.");
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use newsrag::config::AppConfig;
use newsrag::digest::DigestService;
use newsrag::digest::DIGEST_WINDOW_DAYS;
use newsrag::embeddings::backfill_embeddings;
use newsrag::embeddings::EmbeddingService;
use newsrag::ingest::Ingestor;
use newsrag::llm::LlmClient;
use newsrag::llm::Summarizer;
use newsrag::models::NewArticle;
use newsrag::rag::ChatService;
use newsrag::storage;
use newsrag::Result;
use tracing::info;

#[derive(Parser)]
#[command(name = "newsrag")]
#[command(about = "newsrag CLI for ingestion, digests and chat over stored news")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to config.toml / config.example.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,
    /// Ingest raw article records from a JSON file, then prune expired rows
    Ingest {
        /// JSON file holding an array of raw article records
        file: PathBuf,
    },
    /// Build (or serve from cache) the per-section digest
    Digest {
        /// Trailing window in days
        #[arg(short, long, default_value_t = DIGEST_WINDOW_DAYS)]
        days: i64,
    },
    /// Run the hourly digest refresh worker until interrupted
    Watch,
    /// Send one chat message and print the reply with its sources
    Chat {
        /// The user message
        message: String,
        /// Session id; a fresh one is generated when omitted
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print a session's chat history, oldest first
    History {
        session: String,
        #[arg(short, long, default_value = "40")]
        limit: i64,
    },
    /// Delete articles older than the retention window
    Prune {
        /// Override the configured retention window
        #[arg(short, long)]
        days: Option<i64>,
    },
    /// Show article counts and the last scrape time
    Status,
    /// Summarise articles that are still missing a summary
    BackfillSummaries {
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },
    /// Embed articles that are still missing an embedding
    BackfillEmbeddings {
        #[arg(short, long, default_value = "500")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };
    newsrag::logging::init_logging(Some(&config))?;

    let store = storage::connect(&config).await?;

    match cli.command {
        Commands::Init => {
            // Schema initialization happens in connect().
            info!("Database schema initialized");
        }
        Commands::Ingest { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let records: Vec<NewArticle> = serde_json::from_str(&raw)?;
            let ingestor = Ingestor::new(Arc::clone(&store));
            let report = ingestor.ingest_batch(records).await?;
            let pruned = ingestor.prune(config.retention_days()).await?;
            println!(
                "inserted {}, skipped {}, invalid {}, pruned {}",
                report.inserted, report.skipped, report.invalid, pruned
            );
        }
        Commands::Digest { days } => {
            let llm = Arc::new(LlmClient::from_config(&config)?);
            let service = DigestService::new(Arc::clone(&store), llm);
            let payload = service.digest(days).await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Watch => {
            let llm = Arc::new(LlmClient::from_config(&config)?);
            let service = Arc::new(DigestService::new(Arc::clone(&store), llm));
            let worker = Arc::clone(&service).spawn_refresh_loop();
            info!("Digest refresh worker started; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            worker.abort();
        }
        Commands::Chat { message, session } => {
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let service = ChatService::new(Arc::clone(&store), &config)?;
            let outcome = service.chat(&session, &message).await?;
            println!("[session {session}]");
            println!("{}", outcome.reply);
            for source in &outcome.sources {
                println!("  - [{}] {} ({})", source.section, source.title, source.url);
            }
        }
        Commands::History { session, limit } => {
            for message in store.chat_history(&session, limit).await? {
                println!(
                    "{} {:>9}: {}",
                    message.created_at.format("%Y-%m-%d %H:%M"),
                    message.role.as_str(),
                    message.content
                );
            }
        }
        Commands::Prune { days } => {
            let days = days.unwrap_or_else(|| config.retention_days());
            let removed = store.delete_older_than(days).await?;
            println!("removed {removed} article(s) older than {days} day(s)");
        }
        Commands::Status => {
            println!("articles today: {}", store.article_count(1).await?);
            println!("articles this week: {}", store.article_count(7).await?);
            match store.last_scraped().await? {
                Some(ts) => println!("last scraped: {}", ts.to_rfc3339()),
                None => println!("last scraped: never"),
            }
            for section in store.section_counts(1).await? {
                println!("  {:>12}: {}", section.section, section.count);
            }
        }
        Commands::BackfillSummaries { limit } => {
            let llm = Arc::new(LlmClient::from_config(&config)?);
            let summarizer = Summarizer::new(llm);
            let articles = store.articles_missing_summary(limit).await?;
            let report = summarizer.summarise_batch(&store, &articles).await;
            println!("summarised {}, failed {}", report.success, report.failed);
        }
        Commands::BackfillEmbeddings { limit } => {
            let embeddings = Arc::new(EmbeddingService::from_config(&config)?);
            let embedded = backfill_embeddings(&store, &embeddings, limit).await?;
            println!("embedded {embedded} article(s)");
        }
    }

    Ok(())
}

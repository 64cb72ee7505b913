use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use topicscout::clustering::Metric;
use topicscout::config::Config;
use topicscout::db::Database;
use topicscout::enrichment::{Enricher, NoopEnricher, OpenAiEnricher};
use topicscout::pipeline::{RunContext, RunInputs, RunStatus};
use topicscout::signals::{AioSnapshot, SearchRow};
use topicscout::store::jsonl::read_jsonl;
use topicscout::store::{JsonlStore, VectorStore};

/// TopicScout: topic clustering and market-state scoring for community posts.
///
/// Groups post embeddings into topics, fuses engagement with search demand,
/// classifies each topic's market state, and writes cached content briefs.
#[derive(Parser)]
#[command(name = "topicscout", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize (or migrate) the database
    Init,

    /// Cluster a document set, score every topic and enrich the top ones
    Run {
        /// Documents as JSON Lines: {doc_id, embedding, engagement_weight, timestamp, text}
        #[arg(long)]
        documents: PathBuf,

        /// Search-console rows as JSON Lines: {query, month, impressions, clicks, ctr, position}
        #[arg(long)]
        search: Option<PathBuf>,

        /// AI-overview snapshot as JSON Lines: {query, aio_present}
        #[arg(long)]
        aio: Option<PathBuf>,

        /// Explicit run id (default: derived from the current time)
        #[arg(long)]
        run_id: Option<String>,

        /// Max clusters to enrich this run
        #[arg(long)]
        budget: Option<usize>,

        /// Concurrent enrichment calls
        #[arg(long)]
        concurrency: Option<usize>,

        /// Persist clusters and market states but skip the enrichment calls
        #[arg(long)]
        skip_enrichment: bool,

        /// Compute and print everything, write nothing, call nothing
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        min_cluster_size: Option<usize>,

        #[arg(long)]
        min_samples: Option<usize>,

        /// euclidean or cosine
        #[arg(long)]
        metric: Option<Metric>,

        /// Merge clusters split below this distance
        #[arg(long)]
        epsilon: Option<f64>,
    },

    /// Show the stored market-state table of a run
    Report {
        /// Run to show (default: latest)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Show system status (DB stats, latest run, cache size)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("topicscout=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing TopicScout database...");
            let config = Config::load()?;
            let db = topicscout::db::shared(topicscout::db::initialize(&config.db_path)?);
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nTopicScout is ready. Next step: set OPENAI_API_KEY in your .env file");
            println!("\nThen run: topicscout run --documents posts.jsonl --search gsc.jsonl --aio aio.jsonl");
        }

        Commands::Run {
            documents,
            search,
            aio,
            run_id,
            budget,
            concurrency,
            skip_enrichment,
            dry_run,
            min_cluster_size,
            min_samples,
            metric,
            epsilon,
        } => {
            let config = Config::load()?;
            let mut settings = config.settings.clone();
            if let Some(v) = min_cluster_size {
                settings.cluster.min_cluster_size = v;
            }
            if let Some(v) = min_samples {
                settings.cluster.min_samples = v;
            }
            if let Some(v) = metric {
                settings.cluster.metric = v;
            }
            if let Some(v) = epsilon {
                settings.cluster.cluster_selection_epsilon = v;
            }
            if let Some(v) = budget {
                settings.enrich.budget = v;
            }
            if let Some(v) = concurrency {
                settings.enrich.concurrency = v;
            }
            settings.skip_enrichment = skip_enrichment;
            settings.enrich.show_progress = true;

            let inputs = RunInputs {
                documents: JsonlStore::new(&documents)
                    .documents()
                    .with_context(|| format!("Failed to load documents from {}", documents.display()))?,
                search_rows: match &search {
                    Some(path) => read_jsonl::<SearchRow>(path)?,
                    None => Vec::new(),
                },
                aio_snapshots: match &aio {
                    Some(path) => read_jsonl::<AioSnapshot>(path)?,
                    None => Vec::new(),
                },
            };
            println!(
                "Loaded {} documents, {} search rows, {} AI-overview snapshots",
                inputs.documents.len(),
                inputs.search_rows.len(),
                inputs.aio_snapshots.len()
            );

            let ctx = RunContext::new(run_id);

            if dry_run {
                let analysis = topicscout::pipeline::analyze(&settings, &inputs)?;
                topicscout::output::terminal::display_run_summary(&ctx.run_id, &analysis, None);
                topicscout::output::terminal::display_fingerprints(&analysis, 5);
                println!("\n{}", "Dry run: nothing was written and no enrichment calls were made.".dimmed());
                return Ok(());
            }

            let enricher: Box<dyn Enricher> = if skip_enrichment {
                Box::new(NoopEnricher)
            } else {
                config.require_enricher()?;
                Box::new(OpenAiEnricher::new(
                    config.api_url.clone(),
                    config.api_key.clone(),
                    config.model.clone(),
                    config.model_version.clone(),
                    settings.enrich.schema.categories.clone(),
                ))
            };

            // Ctrl-C stops the run between clusters; finished work stays committed
            let cancel = Arc::clone(&ctx.cancel);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Cancellation requested, finishing in-flight clusters");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let db = topicscout::db::shared(topicscout::db::initialize(&config.db_path)?);
            let report = topicscout::pipeline::execute(&ctx, &settings, &inputs, db.as_ref(), enricher.as_ref()).await?;

            topicscout::output::terminal::display_run_summary(
                &report.run_id,
                &report.analysis,
                Some(&report.enrichment),
            );

            match report.status {
                RunStatus::Cancelled => println!("\n{}", "Run cancelled.".yellow().bold()),
                _ => println!("\n{}", "Run complete.".bold()),
            }
            println!("  Report: topicscout report --run-id {}", report.run_id);
        }

        Commands::Report { run_id } => {
            let config = Config::load()?;
            let db = topicscout::db::shared(topicscout::db::open(&config.db_path)?);

            let run = match run_id {
                Some(id) => db.get_run(&id).await?,
                None => db.latest_run().await?,
            };
            let Some(run) = run else {
                println!("No runs recorded yet. Run `topicscout run --documents <file>` first.");
                return Ok(());
            };

            let rows = db.get_market_report(&run.run_id).await?;
            topicscout::output::terminal::display_market_report(&run, &rows);
        }

        Commands::Status => {
            let config = Config::load()?;
            if !topicscout::status::database_exists(&config.db_path) {
                println!("Database: not initialized");
                println!("\nRun `topicscout init` to set up the database.");
                return Ok(());
            }
            let db = topicscout::db::shared(topicscout::db::open(&config.db_path)?);
            topicscout::status::show(&db, &config.db_path).await?;
        }
    }

    Ok(())
}

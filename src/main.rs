use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use popularity_rank::config::{ScoreConfig, SearchConfig};
use popularity_rank::db::{self, PgCounterStore};
use popularity_rank::metrics::MetricsClient;
use popularity_rank::models::{GeoPoint, SearchDocument};
use popularity_rank::period::SystemClock;
use popularity_rank::pipeline::{RunOutcome, ScoringJob};
use popularity_rank::report;
use popularity_rank::search::{ElasticsearchClient, SearchIndex};

#[derive(Parser)]
#[command(name = "popularity-rank")]
#[command(about = "Weekly page-view counters and popularity scores for search ranking", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Settings {
    #[arg(long, env = "DATABASE_URL", hide_env_values = true, global = true)]
    database_url: Option<String>,
    #[arg(long, env = "SEARCH_URL", default_value = "http://localhost:9200", global = true)]
    search_url: String,
    #[arg(long, env = "SEARCH_INDEX", default_value = "restaurants", global = true)]
    search_index: String,
    #[arg(long, env = "SEARCH_TIMEOUT_SECS", default_value_t = 10, global = true)]
    search_timeout_secs: u64,
    #[arg(long, env = "SCORE_SMOOTHING", default_value_t = 10.0, global = true)]
    smoothing: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the historical demo page views
    Seed,
    /// Import weekly counters from a CSV file (entity_id,year,week,count)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Count one page view for the current week
    RecordView { entity_id: String },
    /// Show this week's view count for an entity
    Count { entity_id: String },
    /// Show an entity's weekly views for a year
    Series {
        entity_id: String,
        #[arg(long)]
        year: i32,
    },
    /// Compute popularity scores without publishing them
    Score {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Compute scores and push them to the search index
    Publish,
    /// Upsert one full search document
    Index {
        entity_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long = "cuisine")]
        cuisine: Vec<String>,
        #[arg(long)]
        score: Option<f64>,
    },
    /// Query the search index
    Search {
        #[arg(default_value = "")]
        query: String,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        year: i32,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

impl Settings {
    async fn counter_store(&self) -> anyhow::Result<PgCounterStore> {
        let database_url = self
            .database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(PgCounterStore::new(pool))
    }

    async fn metrics(&self) -> anyhow::Result<MetricsClient<PgCounterStore, SystemClock>> {
        Ok(MetricsClient::new(self.counter_store().await?, SystemClock))
    }

    fn search_index(&self) -> anyhow::Result<ElasticsearchClient> {
        let config = SearchConfig::new(
            &self.search_url,
            &self.search_index,
            Duration::from_secs(self.search_timeout_secs),
        )?;
        Ok(ElasticsearchClient::new(config)?)
    }

    async fn scoring_job(
        &self,
    ) -> anyhow::Result<ScoringJob<PgCounterStore, SystemClock, ElasticsearchClient>> {
        let config = ScoreConfig::new(self.smoothing)?;
        Ok(ScoringJob::new(
            self.metrics().await?,
            self.search_index()?,
            config,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = &cli.settings;

    match cli.command {
        Commands::InitDb => {
            let store = settings.counter_store().await?;
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let store = settings.counter_store().await?;
            let written = db::seed(&store).await?;
            println!("Seeded {written} weekly counters.");
        }
        Commands::Import { csv } => {
            let store = settings.counter_store().await?;
            let imported = db::import_csv(&store, &csv).await?;
            println!("Imported {imported} weekly counters from {}.", csv.display());
        }
        Commands::RecordView { entity_id } => {
            let metrics = settings.metrics().await?;
            let count = metrics.record_view(&entity_id).await?;
            println!("{entity_id}: {count} views this week.");
        }
        Commands::Count { entity_id } => {
            let metrics = settings.metrics().await?;
            let count = metrics.current_count(&entity_id).await?;
            println!("{entity_id}: {count} views this week.");
        }
        Commands::Series { entity_id, year } => {
            let metrics = settings.metrics().await?;
            let series = metrics.year_series(&entity_id, year).await?;
            if series.is_empty() {
                println!("No views recorded for {entity_id} in {year}.");
                return Ok(());
            }
            for week in series {
                println!("{year}-W{:02}: {}", week.week, week.count);
            }
        }
        Commands::Score { limit } => {
            let job = settings.scoring_job().await?;
            let summary = match job.compute().await {
                Ok(summary) => summary,
                Err(err) if err.is_degenerate() => {
                    println!("Not enough distinct traffic to score: {err}");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            println!(
                "Top entities by popularity (system average {:.2}):",
                summary.system_average
            );
            for (rank, entity_id, score) in report::ranked(&summary).into_iter().take(limit) {
                println!("{rank}. {entity_id} score {score:.3}");
            }
        }
        Commands::Publish => {
            let job = settings.scoring_job().await?;
            match job.run().await? {
                RunOutcome::Published(summary) => {
                    println!("Published scores for {} entities.", summary.entity_count);
                }
                RunOutcome::Skipped => println!("A scoring run is already in progress."),
            }
        }
        Commands::Index {
            entity_id,
            name,
            lat,
            lon,
            cuisine,
            score,
        } => {
            let index = settings.search_index()?;
            let document = SearchDocument {
                entity_id,
                name,
                location: GeoPoint { lat, lon },
                cuisine,
                metrics_score: score,
            };
            index.publish(&document).await?;
            println!("Indexed {}.", document.entity_id);
        }
        Commands::Search { query } => {
            let index = settings.search_index()?;
            let hits = index.search(&query).await?;
            if hits.is_empty() {
                println!("No matches.");
            }
            for hit in hits {
                let score = hit
                    .metrics_score
                    .map(|s| format!("{s:.3}"))
                    .unwrap_or_else(|| "unscored".to_string());
                println!("- {} ({}) [{}]", hit.name, hit.cuisine.join(", "), score);
            }
        }
        Commands::Report { year, out } => {
            let job = settings.scoring_job().await?;
            let series = job.metrics().all_series().await?;
            let summary = match job.compute().await {
                Ok(summary) => Some(summary),
                Err(err) if err.is_degenerate() => None,
                Err(err) => return Err(err.into()),
            };
            let report = report::build_report(summary.as_ref(), &series, year);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

//! PatentGraph Scraper CLI
//!
//! Operational back-fills against the configured database:
//! - `scraper enrich <id>...` fetches detail and family data for records
//!   without claims or description text
//! - `scraper family <id>` stores the simple-family similarity edges of one
//!   record

use clap::{Parser, Subcommand};
use patentgraph_common::{config::AppConfig, db::DbPool, PatentRepository, VERSION};
use patentgraph_scraper::{Aggregator, RospatentClient};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scraper", version, about = "Patent aggregation back-fills")]
struct Cli {
    /// Configuration file, replacing the layered config/ lookup
    #[arg(long, env = "APP_CONFIG_FILE")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing detail and family data for the given records
    Enrich {
        /// Patent identifiers
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Fetch and store simple-family similarity edges for one record
    Family {
        /// Patent identifier
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
    }

    info!(service = %config.observability.service_name, "Starting PatentGraph Scraper v{}", VERSION);

    info!("Connecting to database...");
    let pool = DbPool::new(&config.database).await?;
    let repository = PatentRepository::new(pool);
    if config.database.ensure_schema {
        repository.ensure_schema().await?;
    }

    let client = RospatentClient::new(&config.upstream)?;
    let aggregator = Aggregator::new(Arc::new(client), Arc::new(repository), &config.upstream);

    match cli.command {
        Commands::Enrich { ids } => {
            let enriched = aggregator.enrich(&ids).await?;
            info!(requested = ids.len(), enriched, "Enrichment finished");
        }
        Commands::Family { id } => {
            let edges = aggregator.similar_family(&id).await?;
            info!(patent_id = %id, edges = edges.len(), "Family similarity stored");
        }
    }

    Ok(())
}

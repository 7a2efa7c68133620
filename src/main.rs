use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use post_url_repair::budget::Budget;
use post_url_repair::config;
use post_url_repair::db::{self, CreatedRange, PgStore};
use post_url_repair::repair::{self, RepairError};
use post_url_repair::report::{ConsoleSink, ErrorLogSink, MultiSink, RepairSummary};
use post_url_repair::search::OpenSearchClient;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Repair post URLs in the relational store and mirror them to the search index"
)]
struct Args {
    /// Path to YAML config file. Environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append a timestamped line per failed item to this file
    #[arg(long, global = true)]
    error_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rewrite the author key in the URLs of posts created between START and END
    FixUrl {
        /// Inclusive lower bound, e.g. 2023-01-01 or 2023-01-01 00:00:00
        start: String,
        /// Inclusive upper bound
        end: String,
    },
    /// Repair legacy posts listed in the cross-reference backlog
    #[command(alias = "fix-csc")]
    FixCrossReference,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;

    let range = match &args.command {
        Command::FixUrl { start, end } => Some(CreatedRange::parse(start, end)?),
        Command::FixCrossReference => None,
    };

    let budget = Budget::new(cfg.database.query_timeout()).with_run_limit(cfg.repair.run_deadline());

    let pool = db::connect(cfg.database.connect_options(), budget).await?;
    info!(host = %cfg.database.host, name = %cfg.database.name, "database is connected");
    let store = PgStore::new(pool, budget);

    let index = OpenSearchClient::from_config(&cfg.search, budget)?;
    index.ping().await?;

    let mut sink = MultiSink::new().with(ConsoleSink);
    if let Some(path) = &args.error_log {
        sink = sink.with(ErrorLogSink::new(path));
    }

    let result: Result<RepairSummary, RepairError> = match range {
        Some(range) => repair::repair_urls(&store, &index, &cfg, &range, &sink).await,
        None => repair::repair_cross_references(&store, &index, &cfg, &sink).await,
    };

    match result {
        Ok(summary) => info!(repaired = summary.repaired, "all items repaired"),
        Err(err) => {
            error!(failed = err.summary().map_or(0, |s| s.failures.len()), "repair run incomplete");
            println!("{}", err);
        }
    }

    store.pool().close().await;
    Ok(())
}

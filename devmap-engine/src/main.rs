//! devmap-engine - Device Mapping batch binary
//!
//! **[DME-OV-010]** Loads a vendor feed snapshot and the internal catalog,
//! runs the full resolution pipeline over the snapshot, and reports the
//! outcome. Ctrl-C cancels cooperatively; a cancelled run can be resumed by
//! run id.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use devmap_engine::catalog::{InMemoryCatalog, InMemoryKnowledgeBase};
use devmap_engine::config::PipelineConfig;
use devmap_engine::models::{CatalogCandidate, KnowledgeEntry, RawRecord};
use devmap_engine::services::BatchOptions;
use devmap_engine::MappingEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Command-line arguments for devmap-engine
#[derive(Parser, Debug)]
#[command(name = "devmap-engine")]
#[command(about = "Device mapping batch runner for DevMap")]
#[command(version)]
struct Args {
    /// Vendor feed snapshot (JSON array of raw records); falls back to
    /// feed_path in the TOML config
    #[arg(long, env = "DEVMAP_FEED")]
    feed: Option<PathBuf>,

    /// Internal catalog export (JSON array of candidates)
    #[arg(long, env = "DEVMAP_CATALOG")]
    catalog: PathBuf,

    /// Knowledge base export (JSON array of entries)
    #[arg(long, env = "DEVMAP_KNOWLEDGE")]
    knowledge: Option<PathBuf>,

    /// Database path (takes precedence over DEVMAP_DATABASE and the TOML
    /// config)
    #[arg(long)]
    database: Option<String>,

    /// Re-resolve every record even when a cached mapping exists
    #[arg(long)]
    bypass_cache: bool,

    /// Resume a cancelled run by its run id
    #[arg(long, value_name = "RUN_ID")]
    resume: Option<Uuid>,
}

fn load_json<T: serde::de::DeserializeOwned>(path: &PathBuf, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} file {}", what, path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} file {}", what, path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting devmap-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Database path: CLI arg, DEVMAP_DATABASE, TOML config, then default
    let db_path = devmap_common::config::resolve_database_path(args.database.as_deref())?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!("Database: {}", db_path.display());
    let pool = devmap_engine::db::init_database_pool(&db_path).await?;

    // Pipeline tuning: [pipeline] table from the shared TOML config, when
    // one exists
    let pipeline_config = match devmap_common::config::load_toml_config() {
        Ok(toml_config) => PipelineConfig::from_toml(&toml_config.pipeline)?,
        Err(_) => PipelineConfig::default(),
    };

    // Feed path falls back to the TOML config
    let feed_path = match args.feed {
        Some(path) => path,
        None => devmap_common::config::load_toml_config()
            .ok()
            .and_then(|c| c.feed_path)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("No feed file: pass --feed or set feed_path in config"))?,
    };

    let catalog_entries: Vec<CatalogCandidate> = load_json(&args.catalog, "catalog")?;
    info!(entries = catalog_entries.len(), "Catalog loaded");

    let knowledge_entries: Vec<KnowledgeEntry> = match &args.knowledge {
        Some(path) => load_json(path, "knowledge base")?,
        None => Vec::new(),
    };
    if !knowledge_entries.is_empty() {
        info!(entries = knowledge_entries.len(), "Knowledge base loaded");
    }

    let records: Vec<RawRecord> = load_json(&feed_path, "feed")?;
    info!(records = records.len(), feed = %feed_path.display(), "Feed loaded");

    let engine = MappingEngine::new(
        pool,
        pipeline_config,
        Arc::new(InMemoryCatalog::new(catalog_entries)),
        Arc::new(InMemoryKnowledgeBase::new(knowledge_entries)),
    );

    // Ctrl-C requests cooperative cancellation; in-flight records drain and
    // the open run report lets --resume pick up the remainder
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    let options = BatchOptions {
        resume_run_id: args.resume,
        bypass_cache: args.bypass_cache,
    };
    let report = engine.resolve_batch(records, &options).await?;

    info!(
        run_id = %report.run_id,
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped_unchanged = report.skipped_unchanged,
        needs_review = report.needs_review_count,
        cache_hits = report.metrics.cache_hits,
        new_mappings = report.metrics.new_mappings,
        avg_latency_ms = format!("{:.1}", report.metrics.avg_latency_ms()),
        "Batch run report"
    );
    for (bucket, count) in devmap_engine::models::CONFIDENCE_BUCKETS
        .iter()
        .zip(report.by_confidence_bucket.iter())
    {
        info!(bucket = bucket, count = count, "Confidence distribution");
    }

    let health = engine.health(None).await?;
    info!(
        overall = ?health.overall,
        success_rate = format!("{:.1}%", health.success_rate * 100.0),
        avg_confidence = format!("{:.1}", health.avg_confidence),
        "Mapping health"
    );
    for alert in &health.alerts {
        warn!(level = ?alert.level, message = %alert.message, "Health alert");
    }

    if report.cancelled {
        warn!(run_id = %report.run_id, "Run cancelled; resume with --resume {}", report.run_id);
        std::process::exit(2);
    }
    Ok(())
}

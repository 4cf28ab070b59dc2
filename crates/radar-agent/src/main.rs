//! Academic Radar: weekly cross-domain paper discovery.
//! Entry point for the `radar` binary.

mod config;
mod delivery;
mod inputs;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use radar_ingestion::sources::openalex::OpenAlexClient;
use radar_ingestion::{DedupStore, RadarPipeline, SortStrategySelector, SourceSearchStage};
use radar_llm::{build_backend, LlmScorer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::RadarConfig;
use crate::delivery::OutboxDelivery;

#[derive(Parser, Debug)]
#[command(name = "radar", about = "Find papers from other fields that solve your research problem")]
struct Args {
    /// Path to radar.toml (overrides RADAR_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Research profile JSON (overrides inputs.profile_path)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Search queries JSON (overrides inputs.queries_path)
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Build the report but do not deliver it or mark papers as sent
    #[arg(long)]
    skip_email: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = RadarConfig::load(args.config.as_deref())?;

    let profile_path = args.profile.unwrap_or_else(|| config.inputs.profile_path.clone());
    let queries_path = args.queries.unwrap_or_else(|| config.inputs.queries_path.clone());
    let profile = inputs::load_profile(&profile_path)?;
    let queries = inputs::load_queries(&queries_path)?;
    info!(core_task = %profile.core_task, n_queries = queries.len(), "Inputs loaded");

    // A corrupt snapshot stops the run before any network call.
    let store = DedupStore::load(&config.tracker.cache_file, config.retention())
        .context("loading dedup snapshot")?;

    let email = config.openalex.email.clone().unwrap_or_default();
    let source = OpenAlexClient::new(
        email,
        config.openalex.api_key.take(),
        Duration::from_secs(config.openalex.request_timeout_secs),
    )
    .context("set openalex.email in radar.toml or OPENALEX_EMAIL")?;
    let stage = SourceSearchStage::new(
        Arc::new(source),
        SortStrategySelector::default(),
        config.search_config(),
    )?;

    let backend = build_backend(
        config.llm.backend,
        &config.llm.base_url,
        &config.llm.model,
        config.llm.api_key.take(),
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    info!(model = backend.model_id(), local = backend.is_local(), "LLM backend ready");
    let scorer = Arc::new(LlmScorer::new(backend));
    let outbox = Arc::new(OutboxDelivery::new(config.delivery.outbox_dir.clone()));

    let mut pipeline = RadarPipeline::new(
        stage,
        store,
        scorer,
        outbox,
        config.pipeline_config(args.skip_email),
    );
    let report = pipeline.run(&queries, &profile).await?;

    for err in &report.errors {
        warn!("{err}");
    }
    println!(
        "Found {} papers ({} already sent), scored {}, accepted {}.",
        report.papers_found, report.already_sent, report.papers_scored, report.papers_accepted
    );
    for (i, scored) in report.accepted.iter().enumerate() {
        println!("  {}. [{:.2}] {}", i + 1, scored.score, scored.paper.title);
    }
    match &report.delivery {
        Some(receipt) => println!("Report delivered: {}", receipt.reference),
        None if args.skip_email && report.papers_accepted > 0 => {
            println!("Delivery skipped (--skip-email); papers were not marked as sent.")
        }
        None => println!("Nothing delivered."),
    }
    Ok(())
}

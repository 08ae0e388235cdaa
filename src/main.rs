use std::io::BufRead;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use poolmetrics::aggregator::Aggregator;
use poolmetrics::api::routes::{router, ApiState};
use poolmetrics::config::Config;
use poolmetrics::entities::PriceSourceKind;
use poolmetrics::error::{AppError, Result};
use poolmetrics::events::ChainEvent;
use poolmetrics::handlers::EventProcessor;
use poolmetrics::manifest::ManifestLoader;
use poolmetrics::prices::{PeggedQuoteSource, PriceResolver, PriceSource, StaticQuoteSource};
use poolmetrics::store::{EntityStore, KeyedStore};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Price sources, in priority order ---
    let mut sources: Vec<Box<dyn PriceSource>> = Vec::new();
    if let Some(path) = &cfg.quotes_path {
        sources.push(Box::new(StaticQuoteSource::from_file(
            PriceSourceKind::ProtocolOracle,
            path,
        )?));
        info!("Loaded oracle quote table from {path}");
    }
    if !cfg.pegged_tokens.is_empty() {
        info!(
            "Pegged tokens priced at $1.00: {}",
            cfg.pegged_tokens.join(", ")
        );
        sources.push(Box::new(PeggedQuoteSource::new(cfg.pegged_tokens.clone())));
    }
    if sources.is_empty() {
        warn!("No price sources configured; every USD field will be zero");
    }

    // --- Entity graph + sequential journal replay ---
    let store = Arc::new(EntityStore::new());
    let aggregator = Aggregator::new(Arc::clone(&store), PriceResolver::new(sources));
    let mut processor = EventProcessor::new(Arc::clone(&store), aggregator);

    replay_journal(&cfg.journal_path, &mut processor)?;
    info!(
        "Replay complete: {} events → {} markets, {} loans, {} daily / {} hourly snapshots",
        processor.events_applied(),
        store.markets.len(),
        store.loans.len(),
        store.market_daily_snapshots.len(),
        store.market_hourly_snapshots.len(),
    );

    // Publish the singleton even if the journal was empty.
    let protocol = processor.protocol().clone();
    store.protocols.save(&protocol.id.clone(), protocol);

    // --- Dashboard API ---
    let manifest = Arc::new(ManifestLoader::new(cfg.deployments_source.clone()));
    let app = router(ApiState {
        store: Arc::clone(&store),
        manifest,
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Replays the host's JSONL event journal strictly sequentially: each event
/// is handled to completion, including its cascading tick, before the next
/// is considered.
fn replay_journal(path: &str, processor: &mut EventProcessor) -> Result<()> {
    if !std::path::Path::new(path).exists() {
        warn!("Event journal {path} not found; starting with an empty entity graph");
        return Ok(());
    }

    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ChainEvent = serde_json::from_str(&line).map_err(|e| {
            AppError::Journal(format!("{path}:{}: {e}", line_number + 1))
        })?;
        processor.apply(&event);
    }

    Ok(())
}

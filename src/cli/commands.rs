//! CLI command implementations

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use dialoguer::Confirm;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analyzers;
use crate::backfill::{BackfillController, BackfillSummary};
use crate::confidence::{PublicationScorer, QuietModeDetector};
use crate::config::Config;
use crate::context::{BlockContextProvider, EntityRegistry, JsonFileProvider};
use crate::pipeline::{BlockRunner, PipelineOrchestrator, RunSummary};
use crate::signal::SignalType;
use crate::store::{JsonlSignalStore, MemorySignalStore, SignalSink, SignalStore};

/// Open the configured sink, or an in-memory one for dry runs
fn open_sink(config: &Config, dry_run: bool) -> Arc<dyn SignalSink> {
    if dry_run {
        info!("DRY-RUN: signals will not be written to disk");
        Arc::new(MemorySignalStore::new())
    } else {
        Arc::new(JsonlSignalStore::new(&config.store.path))
    }
}

async fn load_registry(config: &Config) -> Result<Arc<EntityRegistry>> {
    let registry = match &config.treasury.registry_path {
        Some(path) => EntityRegistry::load(path)
            .await
            .with_context(|| format!("Failed to load entity registry {}", path))?,
        None => {
            warn!("No entity registry configured - treasury analyzers will find nothing");
            EntityRegistry::new()
        }
    };

    for (kind, count) in registry.kind_counts() {
        info!(kind = ?kind, count, "Registry entities");
    }

    Ok(Arc::new(registry))
}

/// Wire analyzers, store and quiet-mode detector from config
async fn build_orchestrator(config: &Config, dry_run: bool) -> Result<Arc<PipelineOrchestrator>> {
    let registry = load_registry(config).await?;
    let analyzers = analyzers::build_enabled(config, registry);
    let store = SignalStore::new(open_sink(config, dry_run), &config.store);
    let detector = QuietModeDetector::new(&config.confidence);

    let orchestrator =
        PipelineOrchestrator::new(analyzers, store, detector, config.pipeline.clone());
    info!(analyzers = ?orchestrator.analyzer_names(), "Pipeline ready");

    Ok(Arc::new(orchestrator))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}

fn parse_types(value: &str) -> Result<Vec<SignalType>> {
    value
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.parse::<SignalType>().map_err(anyhow::Error::from))
        .collect()
}

/// Keep the requested types that have an enabled analyzer
fn enabled_types(config: &Config, requested: Vec<SignalType>) -> Result<Vec<SignalType>> {
    let (enabled, disabled): (Vec<_>, Vec<_>) = requested
        .into_iter()
        .partition(|t| config.pipeline.is_enabled(*t));

    for signal_type in &disabled {
        warn!(signal_type = %signal_type, "Analyzer not enabled, type ignored");
    }
    if enabled.is_empty() {
        anyhow::bail!("None of the requested signal types have an enabled analyzer");
    }
    Ok(enabled)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the live pipeline over a block file
pub async fn run(
    config: &Config,
    blocks: &str,
    latest: Option<usize>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let provider = Arc::new(JsonFileProvider::load(blocks).await?);
    let heights = provider
        .latest_heights(latest.unwrap_or(provider.len()))
        .await?;

    let orchestrator = build_orchestrator(config, dry_run).await?;
    let runner = BlockRunner::new(
        orchestrator,
        provider,
        config.pipeline.max_concurrent_blocks,
    );

    let summary = runner.run(heights).await;

    if json {
        return print_json(&summary);
    }
    print_run_summary(&summary);
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("\n=== LIVE RUN ===\n");
    println!("Blocks processed:  {}", summary.blocks_processed);
    println!("Blocks failed:     {}", summary.blocks_failed);
    println!("Signals generated: {}", summary.signals_generated);
    println!("Signals persisted: {}", summary.signals_persisted);
    println!("Quiet cycles:      {}", summary.quiet_cycles);
    println!("Duration:          {:.2}s", summary.duration.as_secs_f64());
    print_errors(&summary.errors);
}

fn print_errors(errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    println!("\nErrors ({}):", errors.len());
    for e in errors {
        println!("  - {}", e);
    }
}

/// Replay a historical date range
#[allow(clippy::too_many_arguments)]
pub async fn backfill(
    config: &Config,
    blocks: &str,
    start: &str,
    end: &str,
    types: Option<String>,
    force: bool,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    let types = types
        .as_deref()
        .map(parse_types)
        .transpose()?
        .map(|requested| enabled_types(config, requested))
        .transpose()?;

    if start > end {
        anyhow::bail!("Start date {} is after end date {}", start, end);
    }

    let days = (end - start).num_days() + 1;
    if days > config.backfill.confirm_above_days && !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Backfill {} days at {} blocks/min? This may take a long time.",
                days, config.backfill.rate_limit_blocks_per_minute
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Backfill cancelled by user");
            return Ok(());
        }
    }

    let provider = Arc::new(JsonFileProvider::load(blocks).await?);
    let orchestrator = build_orchestrator(config, dry_run).await?;
    let controller = BackfillController::new(orchestrator, provider, config.backfill.clone());

    let summary = controller.backfill(start, end, types).await?;

    if json {
        return print_json(&summary);
    }
    print_backfill_summary(&summary);
    Ok(())
}

fn print_backfill_summary(summary: &BackfillSummary) {
    println!("\n=== BACKFILL {} .. {} ===\n", summary.start_date, summary.end_date);
    println!("Blocks processed:  {}", summary.blocks_processed);
    println!("Signals generated: {}", summary.signals_generated);
    println!("Signals persisted: {}", summary.signals_persisted);
    println!("Quiet cycles:      {}", summary.quiet_cycles);
    println!("Duration:          {:.2}s", summary.duration.as_secs_f64());
    print_errors(&summary.errors);
}

/// Show unprocessed signals ranked for publication
pub async fn pending(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = JsonlSignalStore::new(&config.store.path);
    let records = store.pending(limit).await?;
    let scorer = PublicationScorer::new(config.publication.clone(), &config.confidence);
    let ranked = scorer.rank(&records);

    if json {
        let scores: Vec<_> = ranked.iter().map(|(_, score)| score).collect();
        return print_json(&scores);
    }

    println!("\n=== PENDING SIGNALS ({}) ===\n", ranked.len());
    if ranked.is_empty() {
        println!("No unprocessed signals.");
        return Ok(());
    }

    for (record, score) in ranked {
        println!(
            "{}  {:<18} block {:<8} conf {:.2}  score {:.2} ({:?}){}",
            record.signal_id,
            record.signal_type.as_str(),
            record.block_height,
            record.confidence,
            score.score,
            score.level,
            if score.publish { "  publish" } else { "" }
        );
    }

    Ok(())
}

/// Acknowledge signals as consumed
pub async fn ack(config: &Config, ids: &[String]) -> Result<()> {
    if ids.is_empty() {
        anyhow::bail!("No signal ids given");
    }

    let store = JsonlSignalStore::new(&config.store.path);
    let marked = store.mark_processed(ids, Utc::now()).await?;

    info!(requested = ids.len(), marked, "Acknowledged signals");
    println!("Marked {} of {} signal(s) as processed", marked, ids.len());

    if marked < ids.len() {
        warn!("Some ids were unknown or already processed");
    }

    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_types() {
        let types = parse_types("mempool, whale-accumulation,").unwrap();
        assert_eq!(
            types,
            vec![SignalType::Mempool, SignalType::WhaleAccumulation]
        );
        assert!(parse_types("mempool,bogus").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-04-20").unwrap(),
            NaiveDate::from_ymd_opt(2024, 4, 20).unwrap()
        );
        assert!(parse_date("20/04/2024").is_err());
    }

    #[test]
    fn test_enabled_types_drops_disabled() {
        let mut config = Config::default();
        config.pipeline.enabled_analyzers = vec![SignalType::Mempool, SignalType::Predictive];

        let kept = enabled_types(
            &config,
            vec![SignalType::Predictive, SignalType::WhaleAccumulation],
        )
        .unwrap();
        assert_eq!(kept, vec![SignalType::Predictive]);

        assert!(enabled_types(&config, vec![SignalType::ExchangeFlow]).is_err());
    }

    #[tokio::test]
    async fn test_dry_run_orchestrator_uses_all_enabled_analyzers() {
        let config = Config::default();
        let orchestrator = build_orchestrator(&config, true).await.unwrap();
        assert_eq!(orchestrator.analyzer_names().len(), 6);
        assert_eq!(orchestrator.store().sink().name(), "memory");
    }
}

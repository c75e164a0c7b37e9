//! tsalarm-worker: runs tests and actions from a rules directory.
//!
//! Loads Test and Action documents, reads series from a directory of JSON
//! files and ticks the engine on a fixed period until Ctrl-C. With `--once`
//! it runs a single tick (optionally at `--at`) and prints the report.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use tsalarm_core::config::load_dotenv;
use tsalarm_core::{Config, DataSource, JsonDirSource};
use tsalarm_rules::{build_rule_set, Engine, RuleLoader};

// ── CLI ─────────────────────────────────────────────────────────────

/// Time-series alarm worker.
#[derive(Parser, Debug)]
#[command(name = "tsalarm-worker", version, about)]
struct Cli {
    /// Config profile (e.g. PROD reads PROD_RULES_DIR before RULES_DIR).
    #[arg(long, env = "TSALARM_PROFILE")]
    profile: Option<String>,

    /// Directory holding Test and Action YAML documents.
    #[arg(long)]
    rules_dir: Option<PathBuf>,

    /// Directory of `<identifier>.json` series files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds between ticks.
    #[arg(long)]
    tick: Option<u64>,

    /// Seconds allowed for resolving one series.
    #[arg(long)]
    timeout: Option<u64>,

    /// Run a single tick, print its report and exit.
    #[arg(long)]
    once: bool,

    /// Evaluation instant for `--once` (`YYYY-MM-DD HH:MM:SS`); defaults to now.
    #[arg(long, value_parser = parse_instant)]
    at: Option<NaiveDateTime>,

    /// Do not hot-reload documents when files change.
    #[arg(long)]
    no_watch: bool,
}

fn parse_instant(s: &str) -> Result<NaiveDateTime, String> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| format!("expected 'YYYY-MM-DD HH:MM:SS', got '{s}'"))
}

fn resolve_config(cli: &Cli) -> Config {
    let mut config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(dir) = &cli.rules_dir {
        config.rules.rules_dir = dir.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data.data_dir = dir.clone();
    }
    if let Some(secs) = cli.tick {
        config.engine.tick_seconds = secs.max(1);
    }
    if let Some(secs) = cli.timeout {
        config.data.timeout_secs = secs;
    }
    if cli.no_watch || cli.once {
        config.rules.watch = false;
    }
    config
}

/// Ticks coarser than a test's interval make its runs late.
fn check_tick_period(engine: &Engine, tick_seconds: u64) {
    let Some(finest) = engine.finest_interval() else {
        return;
    };
    let tick = chrono::Duration::seconds(i64::try_from(tick_seconds).unwrap_or(i64::MAX));
    if tick > finest.approx_duration() {
        warn!(tick_seconds, finest = %finest, "tick period is longer than the finest test interval");
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli);
    config.log_summary();

    let mut loader = RuleLoader::new(config.rules.rules_dir.clone());
    let results = loader.load_all()?;
    let failed = results.iter().filter(|r| r.is_failed()).count();
    let loaded = results.iter().filter(|r| r.is_loaded()).count();
    info!(loaded, failed, "rules directory scanned");
    if config.rules.watch {
        loader.watch()?;
    }

    let source: Arc<dyn DataSource> = Arc::new(JsonDirSource::new(config.data.data_dir.clone()));
    let cancel = Arc::new(AtomicBool::new(false));
    let shutdown = Arc::new(Notify::new());

    let set = build_rule_set(&loader.snapshot());
    let mut engine = Engine::from_rule_set(set, source, config.data.timeout())
        .await
        .with_cancel(cancel.clone());

    {
        let cancel = cancel.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                cancel.store(true, Ordering::SeqCst);
                shutdown.notify_one();
            }
        });
    }

    if cli.once {
        let now = cli.at.unwrap_or_else(|| Local::now().naive_local());
        let report = engine.tick(now).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    check_tick_period(&engine, config.engine.tick_seconds);
    let mut ticker = tokio::time::interval(Duration::from_secs(config.engine.tick_seconds));
    let mut seen_generation = loader.generation();
    info!(tick_seconds = config.engine.tick_seconds, "tsalarm-worker started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.notified() => break,
        }

        let generation = loader.generation();
        if generation != seen_generation {
            seen_generation = generation;
            let set = build_rule_set(&loader.snapshot());
            if !set.errors.is_empty() {
                warn!(failed = set.errors.len(), "some documents failed to build after reload");
            }
            engine.reload(set).await;
            check_tick_period(&engine, config.engine.tick_seconds);
        }

        let report = engine.tick(Local::now().naive_local()).await;
        if report.cancelled {
            break;
        }
    }

    info!("tsalarm-worker exited cleanly");
    Ok(())
}

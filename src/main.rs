//! Crypto upgrade monitor: binary entrypoint.
//! Wires watchers, judges and stores into the pipeline, spawns the polling
//! scheduler and serves the read-only HTTP surface.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use upgrade_monitor::analyze::build_judges;
use upgrade_monitor::api::{self, AppState};
use upgrade_monitor::config::{AiConfig, MonitorConfig};
use upgrade_monitor::ingest::config::load_registry_default;
use upgrade_monitor::ingest::http::{Fetcher, HttpFetcher};
use upgrade_monitor::ingest::providers::{watchers_for, Credentials};
use upgrade_monitor::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use upgrade_monitor::ingest::types::Watcher;
use upgrade_monitor::metrics::Metrics;
use upgrade_monitor::notify::NotifierMux;
use upgrade_monitor::pipeline::{Pipeline, PipelineConfig};
use upgrade_monitor::source_weights::SourceWeights;
use upgrade_monitor::store::{FileCursorStore, FileOutputStore, OutputStore};

const DEFAULT_LOG_FILTER: &str =
    "upgrade_monitor=info,pipeline=info,ingest=info,store=info,oracle=info,scheduler=info,warn";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    // The runtime may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let registry = Arc::new(load_registry_default().context("loading source registry")?);
    let cfg = MonitorConfig::from_env();
    let ai = AiConfig::load_or_default(&cfg.ai_config_path);
    let weights = SourceWeights::load_from_file(&cfg.source_weights_path);
    tracing::info!(
        projects = registry.projects.len(),
        threshold = cfg.confidence_threshold,
        interval_s = cfg.poll_interval_secs,
        window_h = cfg.cluster_window_hours,
        "monitor config loaded"
    );

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(cfg.http_timeout())?);
    let creds = Credentials::from_env();
    let watchers: Vec<Arc<dyn Watcher>> = registry
        .projects
        .values()
        .flat_map(|p| watchers_for(p, fetcher.clone(), &creds))
        .collect();

    let (oracle, verifier) = build_judges(&ai, &registry, weights, cfg.confidence_threshold);
    let output: Arc<dyn OutputStore> = Arc::new(FileOutputStore::in_dir(&cfg.data_dir));
    let cursors = Arc::new(FileCursorStore::in_dir(&cfg.data_dir));

    let notifier = NotifierMux::from_env();
    if notifier.is_empty() {
        tracing::info!("no notification webhooks configured");
    }

    let pipeline = Arc::new(Pipeline::new(
        registry,
        watchers,
        cursors,
        output.clone(),
        oracle,
        verifier,
        Arc::new(notifier),
        PipelineConfig::from(&cfg),
    ));
    tracing::info!(watchers = pipeline.watcher_count(), "pipeline ready");

    // Install the recorder before the first cycle runs.
    let mut state = AppState::new(output);
    match Metrics::init(cfg.poll_interval_secs, cfg.confidence_threshold) {
        Ok(m) => state = state.with_prometheus(m.handle),
        Err(e) => tracing::warn!(error = ?e, "prometheus recorder unavailable; /metrics disabled"),
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_scheduler(
        pipeline,
        SchedulerCfg {
            interval: cfg.poll_interval(),
        },
        shutdown_rx,
    );
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    Ok(api::router(state).into())
}

// src/pipeline.rs
//! One monitoring cycle: poll → relevance filter → cluster → verify →
//! status → canonicalize → persist → flush → advance cursors.
//!
//! Every collaborator is injected, so tests drive a full cycle against
//! fixture fetchers and in-memory stores.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::analyze::{cluster_events, resolve_status, RelevanceOracle, Verifier};
use crate::canonical::canonicalize;
use crate::error::PipelineError;
use crate::ingest::config::{ProjectConfig, SourceRegistry};
use crate::ingest::newer_than;
use crate::ingest::types::{RawEvent, Watcher, WatcherId};
use crate::model::{AffectedSubtype, CanonicalUpgrade, UpgradeStatus};
use crate::notify::Notifier;
use crate::store::{CursorStore, OutputStore};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub confidence_threshold: f32,
    pub cluster_window: chrono::Duration,
    pub poll_concurrency: usize,
    pub poll_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: crate::analyze::DEFAULT_CONFIDENCE_THRESHOLD,
            cluster_window: crate::analyze::default_window(),
            poll_concurrency: 4,
            poll_timeout: Duration::from_secs(120),
        }
    }
}

impl From<&crate::config::MonitorConfig> for PipelineConfig {
    fn from(c: &crate::config::MonitorConfig) -> Self {
        Self {
            confidence_threshold: c.confidence_threshold,
            cluster_window: c.cluster_window(),
            poll_concurrency: c.poll_concurrency,
            poll_timeout: c.poll_timeout(),
        }
    }
}

/// Counters for one cycle; also logged at the end of the cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub watchers_polled: usize,
    pub watchers_timed_out: usize,
    pub events: usize,
    pub relevant: usize,
    pub clusters: usize,
    pub discarded: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub project_errors: usize,
    pub cursors_advanced: usize,
    pub flushed: bool,
}

/// Result of polling one watcher. `None` events: the poll timed out.
struct PollOutcome {
    index: usize,
    id: WatcherId,
    project: String,
    events: Option<Vec<RawEvent>>,
}

pub struct Pipeline {
    registry: Arc<SourceRegistry>,
    watchers: Vec<Arc<dyn Watcher>>,
    cursors: Arc<dyn CursorStore>,
    output: Arc<dyn OutputStore>,
    oracle: Arc<dyn RelevanceOracle>,
    verifier: Arc<dyn Verifier>,
    notifier: Arc<dyn Notifier>,
    cfg: PipelineConfig,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SourceRegistry>,
        watchers: Vec<Arc<dyn Watcher>>,
        cursors: Arc<dyn CursorStore>,
        output: Arc<dyn OutputStore>,
        oracle: Arc<dyn RelevanceOracle>,
        verifier: Arc<dyn Verifier>,
        notifier: Arc<dyn Notifier>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            watchers,
            cursors,
            output,
            oracle,
            verifier,
            notifier,
            cfg,
        }
    }

    pub fn output(&self) -> Arc<dyn OutputStore> {
        self.output.clone()
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Run one full cycle. Never fails: per-source, per-project and store
    /// faults are logged and reflected in the report.
    pub async fn run_cycle(&self) -> CycleReport {
        crate::ingest::ensure_metrics_described();
        let mut report = CycleReport {
            run_id: Uuid::new_v4(),
            ..Default::default()
        };
        tracing::info!(target: "pipeline", run_id = %report.run_id, watchers = self.watchers.len(), "cycle start");

        // 1) Poll
        let outcomes = self.poll_all().await;
        report.watchers_polled = outcomes.len();
        report.watchers_timed_out = outcomes.iter().filter(|o| o.events.is_none()).count();

        // Newest emitted timestamp per watcher; applied after the flush.
        let mut pending: Vec<(WatcherId, String, DateTime<Utc>)> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut events: Vec<RawEvent> = Vec::new();
        for o in outcomes {
            let Some(evs) = o.events else { continue };
            if let Some(max_ts) = evs.iter().map(|e| e.timestamp).max() {
                pending.push((o.id, o.project, max_ts));
            }
            for ev in evs {
                if seen.insert((ev.project.clone(), ev.url.clone())) {
                    events.push(ev);
                }
            }
        }
        report.events = events.len();

        // 2) Relevance filter, grouped per project
        let mut by_project: BTreeMap<String, Vec<RawEvent>> = BTreeMap::new();
        let mut subtypes: HashMap<String, Vec<AffectedSubtype>> = HashMap::new();
        for ev in events {
            let project = self.project_config(&ev.project);
            let signal = self.oracle.classify(&ev, &project).await;
            if !signal.is_relevant {
                continue;
            }
            if !signal.affected_subtypes.is_empty() {
                subtypes.insert(ev.id.clone(), signal.affected_subtypes);
            }
            by_project.entry(ev.project.clone()).or_default().push(ev);
        }
        report.relevant = by_project.values().map(Vec::len).sum();
        counter!("pipeline_relevant_total").increment(report.relevant as u64);

        // 3..6) Per project: cluster, verify, resolve, canonicalize, upsert
        let mut failed_projects: HashSet<String> = HashSet::new();
        let mut store_failed = false;
        let mut fresh: Vec<CanonicalUpgrade> = Vec::new();
        for (name, evs) in by_project {
            match self.process_project(&name, evs, &subtypes, &mut report).await {
                Ok(outcome) => {
                    store_failed |= outcome.store_failed;
                    fresh.extend(outcome.inserted);
                }
                Err(e) => {
                    tracing::error!(target: "pipeline", project = %name, error = %e, "project aborted for this cycle");
                    counter!("pipeline_project_errors_total").increment(1);
                    report.project_errors += 1;
                    failed_projects.insert(name);
                }
            }
        }
        report.inserted = fresh.len();

        // 7) Flush; cursors only move once output is durable.
        if let Err(e) = self.output.flush().await {
            tracing::error!(target: "store", error = ?e, "output flush failed; cursors not advanced");
            return self.finish(report);
        }
        report.flushed = true;

        for rec in &fresh {
            if let Err(e) = self.notifier.send(rec).await {
                tracing::warn!(target: "pipeline", error = ?e, "notifier failed");
            }
        }

        // 8) Advance cursors
        if store_failed {
            tracing::warn!(target: "store", "output upsert failed this cycle; cursors not advanced");
        } else {
            for (id, project, ts) in pending {
                if failed_projects.contains(&project) {
                    continue;
                }
                match self.cursors.set(&id, ts).await {
                    Ok(()) => report.cursors_advanced += 1,
                    Err(e) => {
                        tracing::warn!(target: "store", watcher = %id, error = ?e, "cursor write failed")
                    }
                }
            }
        }

        self.finish(report)
    }

    fn finish(&self, report: CycleReport) -> CycleReport {
        gauge!("pipeline_last_run_ts").set(Utc::now().timestamp() as f64);
        tracing::info!(
            target: "pipeline",
            run_id = %report.run_id,
            events = report.events,
            relevant = report.relevant,
            clusters = report.clusters,
            discarded = report.discarded,
            inserted = report.inserted,
            duplicates = report.duplicates,
            timed_out = report.watchers_timed_out,
            cursors = report.cursors_advanced,
            "cycle done"
        );
        report
    }

    fn project_config(&self, name: &str) -> ProjectConfig {
        self.registry.project(name).cloned().unwrap_or_else(|| ProjectConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Bounded concurrent polling; results come back in watcher order.
    async fn poll_all(&self) -> Vec<PollOutcome> {
        let timeout = self.cfg.poll_timeout;
        let polls: Vec<_> = self
            .watchers
            .iter()
            .enumerate()
            .map(|(index, w)| poll_one(index, w.clone(), self.cursors.clone(), timeout))
            .collect();
        let mut out: Vec<PollOutcome> = stream::iter(polls)
            .buffer_unordered(self.cfg.poll_concurrency.max(1))
            .collect()
            .await;
        out.sort_by_key(|o| o.index);
        out
    }

    async fn process_project(
        &self,
        name: &str,
        events: Vec<RawEvent>,
        subtypes: &HashMap<String, Vec<AffectedSubtype>>,
        report: &mut CycleReport,
    ) -> Result<ProjectOutcome, PipelineError> {
        let project = self.project_config(name);
        let clusters = cluster_events(events, self.cfg.cluster_window);
        report.clusters += clusters.len();
        counter!("pipeline_clusters_total").increment(clusters.len() as u64);

        let mut outcome = ProjectOutcome::default();
        for cluster in clusters {
            let confirmation = self.verifier.verify(&cluster).await;
            if confirmation.confidence < self.cfg.confidence_threshold {
                tracing::debug!(
                    target: "pipeline",
                    project = name,
                    size = cluster.len(),
                    confidence = confirmation.confidence,
                    reasoning = %confirmation.reasoning,
                    "cluster below threshold"
                );
                counter!("pipeline_discarded_total").increment(1);
                report.discarded += 1;
                continue;
            }

            let detected = confirmation
                .status_detected
                .as_deref()
                .and_then(UpgradeStatus::from_detected);
            let status = match (detected, cluster.first()) {
                (Some(UpgradeStatus::Rejected), _) => UpgradeStatus::Rejected,
                (_, Some(first)) => resolve_status(&first.text),
                (_, None) => UpgradeStatus::ProposalOnly,
            };

            let record = canonicalize(&cluster, &confirmation, status, subtypes, &project)?;
            match self.output.upsert(record.clone()).await {
                Ok(true) => {
                    tracing::info!(
                        target: "pipeline",
                        project = name,
                        headline = %record.headline,
                        status = %record.status,
                        confidence = record.confidence,
                        "new canonical upgrade"
                    );
                    counter!("pipeline_upgrades_total").increment(1);
                    outcome.inserted.push(record);
                }
                Ok(false) => report.duplicates += 1,
                Err(e) => {
                    tracing::error!(target: "store", project = name, error = ?e, "upsert failed");
                    outcome.store_failed = true;
                }
            }
        }
        Ok(outcome)
    }
}

#[derive(Default)]
struct ProjectOutcome {
    inserted: Vec<CanonicalUpgrade>,
    store_failed: bool,
}

/// Poll one watcher under `timeout`. Owns its inputs so the future is
/// `'static` and can be driven from a spawned scheduler task.
async fn poll_one(
    index: usize,
    w: Arc<dyn Watcher>,
    cursors: Arc<dyn CursorStore>,
    timeout: Duration,
) -> PollOutcome {
    let cursor = cursors.get(w.id()).await;
    let events = match tokio::time::timeout(timeout, w.poll(cursor)).await {
        Ok(mut evs) => {
            // Watchers filter already; keep the cursor contract even if one slips.
            evs.retain(|e| newer_than(cursor, e.timestamp));
            tracing::debug!(target: "pipeline", watcher = %w.id(), events = evs.len(), "polled");
            Some(evs)
        }
        Err(_) => {
            tracing::warn!(target: "pipeline", watcher = %w.id(), timeout_s = timeout.as_secs(), "watcher poll timed out");
            counter!("ingest_source_errors_total", "kind" => w.kind().as_str()).increment(1);
            None
        }
    };
    PollOutcome {
        index,
        id: w.id().clone(),
        project: w.project().to_string(),
        events,
    }
}

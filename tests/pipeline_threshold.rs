// tests/pipeline_threshold.rs
//
// Discard filter and status resolution with a verifier that returns exact,
// text-keyed verdicts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use upgrade_monitor::analyze::{KeywordOracle, Verifier};
use upgrade_monitor::ingest::config::SourceRegistry;
use upgrade_monitor::ingest::types::{RawEvent, SourceKind, Watcher, WatcherId};
use upgrade_monitor::model::{UpgradeConfirmation, UpgradeStatus};
use upgrade_monitor::notify::NotifierMux;
use upgrade_monitor::store::{MemoryCursorStore, MemoryOutputStore, OutputStore};
use upgrade_monitor::{Pipeline, PipelineConfig};

struct Canned {
    id: WatcherId,
    events: Vec<RawEvent>,
}

#[async_trait]
impl Watcher for Canned {
    fn id(&self) -> &WatcherId {
        &self.id
    }
    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }
    fn project(&self) -> &str {
        "aave"
    }
    async fn poll(&self, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        self.events
            .iter()
            .filter(|e| cursor.map_or(true, |c| e.timestamp > c))
            .cloned()
            .collect()
    }
}

/// Confidence and detected status keyed on a marker word in the text.
struct ByMarker;

#[async_trait]
impl Verifier for ByMarker {
    async fn verify(&self, cluster: &[RawEvent]) -> UpgradeConfirmation {
        let text = &cluster[0].text;
        let (confidence, status) = if text.contains("alpha") {
            (0.55, None)
        } else if text.contains("beta") {
            (0.6, None)
        } else if text.contains("gamma") {
            (0.9, Some("rejected".to_string()))
        } else {
            (0.0, None)
        };
        UpgradeConfirmation {
            is_confirmed: confidence >= 0.6,
            confidence,
            status_detected: status,
            evidence: vec![],
            reasoning: "canned".into(),
        }
    }

    fn name(&self) -> &'static str {
        "by-marker"
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn event(text: &str, slug: &str, days: i64) -> RawEvent {
    RawEvent::new(
        "aave",
        SourceKind::Feed,
        "Aave Labs",
        text,
        format!("https://aave.com/blog/{slug}"),
        t0() + Duration::days(days),
    )
}

fn pipeline(events: Vec<RawEvent>, output: Arc<MemoryOutputStore>) -> Pipeline {
    Pipeline::new(
        Arc::new(SourceRegistry::default()),
        vec![Arc::new(Canned {
            id: WatcherId::from("aave_feed"),
            events,
        })],
        Arc::new(MemoryCursorStore::new()),
        output,
        Arc::new(KeywordOracle::new(["aave"])),
        Arc::new(ByMarker),
        Arc::new(NotifierMux::new()),
        PipelineConfig {
            confidence_threshold: 0.6,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn confidence_exactly_at_threshold_is_kept() {
    let output = Arc::new(MemoryOutputStore::new());
    // Three days apart: three separate clusters.
    let p = pipeline(
        vec![
            event("GHO alpha upgrade is live", "alpha", 0),
            event("Aave beta upgrade is live", "beta", 3),
            event("Fee switch gamma proposal executed", "gamma", 6),
        ],
        output.clone(),
    );

    let report = p.run_cycle().await;
    assert_eq!(report.clusters, 3);
    assert_eq!(report.discarded, 1);
    assert_eq!(report.inserted, 2);

    let all = output.all().await;
    let headlines: Vec<&str> = all.iter().map(|r| r.headline.as_str()).collect();
    assert!(headlines.contains(&"Aave beta upgrade is live"));
    assert!(!headlines.iter().any(|h| h.contains("alpha")));
}

#[tokio::test]
async fn rejection_from_verifier_overrides_keyword_status() {
    let output = Arc::new(MemoryOutputStore::new());
    let p = pipeline(
        vec![
            event("Aave beta upgrade is live", "beta", 0),
            event("Fee switch gamma proposal executed", "gamma", 3),
        ],
        output.clone(),
    );
    p.run_cycle().await;

    let all = output.all().await;
    let status_of = |needle: &str| {
        all.iter()
            .find(|r| r.headline.contains(needle))
            .map(|r| r.status)
    };
    assert_eq!(status_of("beta"), Some(UpgradeStatus::DeployedMainnet));
    assert_eq!(status_of("gamma"), Some(UpgradeStatus::Rejected));
}

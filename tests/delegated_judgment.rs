// tests/delegated_judgment.rs
//
// Pipeline cycles with language-model judgments replaced by a scripted client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use upgrade_monitor::analyze::ai_adapter::{AiClient, DynAiClient};
use upgrade_monitor::analyze::{DelegatedOracle, DelegatedVerifier};
use upgrade_monitor::ingest::config::{ProjectConfig, SourceRegistry};
use upgrade_monitor::ingest::types::{RawEvent, SourceKind, Watcher, WatcherId};
use upgrade_monitor::model::UpgradeStatus;
use upgrade_monitor::notify::NotifierMux;
use upgrade_monitor::store::{CursorStore, MemoryCursorStore, MemoryOutputStore, OutputStore};
use upgrade_monitor::{Pipeline, PipelineConfig};

/// Relevance: only texts mentioning "mainnet". Verification: confirmed live.
struct Scripted;

impl AiClient for Scripted {
    fn judge<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>> {
        let out = if system.starts_with("You classify") {
            if prompt.contains("mainnet") {
                json!({
                    "is_relevant": true,
                    "affected_subtypes": [
                        {"subtype_code": "payments", "impact_type": "modified",
                         "quote": "gas costs drop", "confidence": 0.9},
                        {"subtype_code": "payments", "impact_type": "removed", "quote": ""},
                        {"subtype_code": "memes", "impact_type": "introduced", "quote": "wow"}
                    ]
                })
            } else {
                json!({"is_relevant": false, "affected_subtypes": []})
            }
        } else {
            json!({
                "tier": "confirmed_live",
                "status_detected": "deployed_mainnet",
                "reasoning": "Live on mainnet with success phrasing."
            })
        };
        Box::pin(async move { Some(out) })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// Client that never produces an answer (provider down, limit reached).
struct Silent;

impl AiClient for Silent {
    fn judge<'a>(
        &'a self,
        _system: &'a str,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>> {
        Box::pin(async { None })
    }

    fn provider_name(&self) -> &'static str {
        "silent"
    }
}

struct Posts(WatcherId, Vec<RawEvent>);

#[async_trait]
impl Watcher for Posts {
    fn id(&self) -> &WatcherId {
        &self.0
    }
    fn kind(&self) -> SourceKind {
        SourceKind::Social
    }
    fn project(&self) -> &str {
        "arbitrum"
    }
    async fn poll(&self, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        self.1
            .iter()
            .filter(|e| cursor.map_or(true, |c| e.timestamp > c))
            .cloned()
            .collect()
    }
}

fn posts() -> Vec<RawEvent> {
    let t = |h| Utc.with_ymd_and_hms(2024, 3, 14, h, 0, 0).unwrap();
    vec![
        RawEvent::new(
            "arbitrum",
            SourceKind::Social,
            "arbitrum",
            "ArbOS 20 Atlas is live on mainnet: gas costs drop with blobs",
            "https://x.com/arbitrum/status/1",
            t(9),
        ),
        RawEvent::new(
            "arbitrum",
            SourceKind::Social,
            "arbitrum",
            "Join our community call on Thursday",
            "https://x.com/arbitrum/status/2",
            t(10),
        ),
    ]
}

fn pipeline(
    client: DynAiClient,
    cursors: Arc<MemoryCursorStore>,
    output: Arc<MemoryOutputStore>,
) -> Pipeline {
    let mut reg = SourceRegistry::default();
    reg.projects.insert(
        "arbitrum".into(),
        ProjectConfig {
            name: "arbitrum".into(),
            networks: vec!["arbitrum-one".into(), "ethereum".into()],
            relevant_tokens: vec!["ARB".into()],
            ..Default::default()
        },
    );
    Pipeline::new(
        Arc::new(reg),
        vec![Arc::new(Posts(WatcherId::from("arbitrum_social"), posts()))],
        cursors,
        output,
        Arc::new(DelegatedOracle::new(client.clone())),
        Arc::new(DelegatedVerifier::new(client, 0.6)),
        Arc::new(NotifierMux::new()),
        PipelineConfig::default(),
    )
}

#[tokio::test]
async fn quoted_claims_survive_into_the_record() {
    let cursors = Arc::new(MemoryCursorStore::new());
    let output = Arc::new(MemoryOutputStore::new());
    let report = pipeline(Arc::new(Scripted), cursors.clone(), output.clone())
        .run_cycle()
        .await;
    assert_eq!(report.relevant, 1);
    assert_eq!(report.inserted, 1);

    let all = output.all().await;
    let rec = &all[0];
    assert_eq!(rec.network, "arbitrum-one");
    assert_eq!(rec.status, UpgradeStatus::DeployedMainnet);
    assert_eq!(rec.confidence, 1.0);
    assert_eq!(rec.reasoning, "Live on mainnet with success phrasing.");
    assert_eq!(rec.affected_subtypes.len(), 1);
    assert_eq!(rec.affected_subtypes[0].subtype_code, "payments");
    assert_eq!(rec.affected_subtypes[0].reason, "gas costs drop");
}

#[tokio::test]
async fn unavailable_judgment_stores_nothing_but_still_advances() {
    let cursors = Arc::new(MemoryCursorStore::new());
    let output = Arc::new(MemoryOutputStore::new());
    let report = pipeline(Arc::new(Silent), cursors.clone(), output.clone())
        .run_cycle()
        .await;
    assert_eq!(report.events, 2);
    assert_eq!(report.relevant, 0);
    assert!(output.all().await.is_empty());
    assert_eq!(
        cursors.get(&WatcherId::from("arbitrum_social")).await,
        Some(Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap())
    );
}

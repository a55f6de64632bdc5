// tests/pipeline_cycle.rs
//
// Full cycles against canned upstream responses and in-memory stores.
//
// Covered:
// - blog post + code release → one multi-source canonical record
// - a second cycle without new upstream data changes nothing
// - a new post with an already-stored headline is a duplicate
// - a failing flush leaves every cursor untouched

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use upgrade_monitor::analyze::{KeywordOracle, WeightedVerifier};
use upgrade_monitor::ingest::config::{ProjectConfig, SourceRegistry};
use upgrade_monitor::ingest::http::{Fetcher, FixtureFetcher};
use upgrade_monitor::ingest::providers::{watchers_for, Credentials};
use upgrade_monitor::ingest::types::WatcherId;
use upgrade_monitor::model::{CanonicalUpgrade, UpgradeStatus};
use upgrade_monitor::notify::NotifierMux;
use upgrade_monitor::store::{CursorStore, MemoryCursorStore, MemoryOutputStore, OutputStore};
use upgrade_monitor::{Pipeline, PipelineConfig};

const BLOG_FEED: &str = "https://blog.lido.fi/feed";
const ORG_REPOS: &str =
    "https://api.github.com/orgs/lidofinance/repos?sort=pushed&direction=desc&per_page=5";
const CORE_RELEASES: &str = "https://api.github.com/repos/lidofinance/core/releases?per_page=10";

fn lido() -> ProjectConfig {
    ProjectConfig {
        name: "lido".into(),
        networks: vec!["ethereum".into()],
        relevant_tokens: vec!["LDO".into(), "stETH".into()],
        blogs: vec!["blog.lido.fi".into()],
        github_orgs: vec!["lidofinance".into()],
        ..Default::default()
    }
}

fn registry() -> SourceRegistry {
    let mut reg = SourceRegistry::default();
    reg.projects.insert("lido".into(), lido());
    reg
}

fn fixtures() -> Arc<FixtureFetcher> {
    Arc::new(
        FixtureFetcher::new()
            .with(BLOG_FEED, include_str!("fixtures/lido_blog_rss.xml"))
            .with(ORG_REPOS, r#"[{"full_name": "lidofinance/core"}]"#)
            .with(CORE_RELEASES, include_str!("fixtures/lido_core_releases.json")),
    )
}

fn build(
    fetcher: Arc<FixtureFetcher>,
    cursors: Arc<dyn CursorStore>,
    output: Arc<dyn OutputStore>,
    threshold: f32,
) -> Pipeline {
    let reg = registry();
    let dyn_fetcher: Arc<dyn Fetcher> = fetcher;
    let watchers = watchers_for(&lido(), dyn_fetcher, &Credentials::default());
    Pipeline::new(
        Arc::new(reg),
        watchers,
        cursors,
        output,
        Arc::new(KeywordOracle::default()),
        Arc::new(WeightedVerifier::new(Default::default(), threshold)),
        Arc::new(NotifierMux::new()),
        PipelineConfig {
            confidence_threshold: threshold,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn blog_and_release_merge_into_one_record() {
    let cursors = Arc::new(MemoryCursorStore::new());
    let output = Arc::new(MemoryOutputStore::new());
    let pipeline = build(fixtures(), cursors.clone(), output.clone(), 0.6);

    let report = pipeline.run_cycle().await;
    assert_eq!(report.events, 3, "AMA post, V3 post, one dated release");
    assert_eq!(report.relevant, 2);
    assert_eq!(report.clusters, 1);
    assert_eq!(report.inserted, 1);
    assert!(report.flushed);

    let all = output.all().await;
    assert_eq!(all.len(), 1);
    let rec = &all[0];
    assert_eq!(rec.project, "lido");
    assert_eq!(rec.network, "ethereum");
    assert_eq!(rec.headline, "Lido V3 is live on Ethereum mainnet");
    assert_eq!(rec.status, UpgradeStatus::DeployedMainnet);
    assert_eq!(rec.primary_source, "https://blog.lido.fi/lido-v3-is-live");
    assert_eq!(
        rec.supporting_sources,
        vec!["https://github.com/lidofinance/core/releases/tag/v3.0.0".to_string()]
    );
    assert!(rec.confidence >= 0.9 && rec.confidence <= 1.0);
    assert_eq!(rec.affected_subtypes.len(), 1);
    assert_eq!(rec.affected_subtypes[0].subtype_code, "collateral");

    assert_eq!(
        cursors.get(&WatcherId::from("lido_feed")).await,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap())
    );
    assert_eq!(
        cursors.get(&WatcherId::from("lido_code_release")).await,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn second_cycle_without_new_data_is_a_no_op() {
    let cursors = Arc::new(MemoryCursorStore::new());
    let output = Arc::new(MemoryOutputStore::new());
    let pipeline = build(fixtures(), cursors.clone(), output.clone(), 0.6);

    let first = pipeline.run_cycle().await;
    assert_eq!(first.inserted, 1);
    let cursors_after_first = cursors.snapshot();

    let second = pipeline.run_cycle().await;
    assert_eq!(second.events, 0);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.cursors_advanced, 0);
    assert_eq!(cursors.snapshot(), cursors_after_first);
    assert_eq!(output.all().await.len(), 1);
}

#[tokio::test]
async fn repeated_headline_from_new_url_is_not_stored_twice() {
    let fetcher = fixtures();
    let cursors = Arc::new(MemoryCursorStore::new());
    let output = Arc::new(MemoryOutputStore::new());
    let pipeline = build(fetcher.clone(), cursors.clone(), output.clone(), 0.45);
    assert_eq!(pipeline.run_cycle().await.inserted, 1);

    // A week later the post is republished under a new slug. Alone it
    // scores 0.50 (feed + live bonus), above this pipeline's threshold.
    fetcher.set(
        BLOG_FEED,
        200,
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item>
    <title>Lido V3 is live on Ethereum mainnet</title>
    <link>https://blog.lido.fi/lido-v3-is-live-2</link>
    <pubDate>Wed, 08 May 2024 06:00:00 +0000</pubDate>
    <description>Republished: staking vaults are live.</description>
  </item>
</channel></rss>"#,
    );

    let report = pipeline.run_cycle().await;
    assert_eq!(report.events, 1);
    assert_eq!(report.inserted, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(output.all().await.len(), 1);
    // Nothing new was stored, but the watcher still moves past the republished post.
    assert_eq!(
        cursors.get(&WatcherId::from("lido_feed")).await,
        Some(Utc.with_ymd_and_hms(2024, 5, 8, 6, 0, 0).unwrap())
    );
}

struct BrokenDisk(MemoryOutputStore);

#[async_trait]
impl OutputStore for BrokenDisk {
    async fn upsert(&self, record: CanonicalUpgrade) -> anyhow::Result<bool> {
        self.0.upsert(record).await
    }
    async fn flush(&self) -> anyhow::Result<()> {
        Err(anyhow!("disk full"))
    }
    async fn all(&self) -> Vec<CanonicalUpgrade> {
        self.0.all().await
    }
}

#[tokio::test]
async fn failed_flush_keeps_cursors_in_place() {
    let cursors = Arc::new(MemoryCursorStore::new());
    let output = Arc::new(BrokenDisk(MemoryOutputStore::new()));
    let pipeline = build(fixtures(), cursors.clone(), output, 0.6);

    let report = pipeline.run_cycle().await;
    assert_eq!(report.inserted, 1);
    assert!(!report.flushed);
    assert_eq!(report.cursors_advanced, 0);
    assert!(cursors.get(&WatcherId::from("lido_feed")).await.is_none());
    assert!(cursors.get(&WatcherId::from("lido_code_release")).await.is_none());
}

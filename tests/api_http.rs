// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - GET /upgrades (ordering, project and status filters, bad status)
// - GET /metrics with and without a recorder

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`
use uuid::Uuid;

use upgrade_monitor::api::{self, AppState};
use upgrade_monitor::model::{CanonicalUpgrade, UpgradeStatus};
use upgrade_monitor::store::{MemoryOutputStore, OutputStore};

const BODY_LIMIT: usize = 1024 * 1024;

fn record(project: &str, headline: &str, day: u32, status: UpgradeStatus) -> CanonicalUpgrade {
    CanonicalUpgrade {
        canonical_id: Uuid::new_v4(),
        headline: headline.into(),
        project: project.into(),
        network: "ethereum".into(),
        status,
        primary_source: format!("https://{project}.example/{day}"),
        supporting_sources: vec![],
        timestamp: Utc.with_ymd_and_hms(2024, 4, day, 0, 0, 0).unwrap(),
        confidence: 0.8,
        reasoning: "Score 0.80 from sources: feed: team".into(),
        affected_subtypes: vec![],
    }
}

async fn test_router() -> Router {
    let store = Arc::new(MemoryOutputStore::new());
    for r in [
        record("lido", "Lido V3 is live", 10, UpgradeStatus::DeployedMainnet),
        record("aave", "Aave v4 proposal", 20, UpgradeStatus::ProposalOnly),
        record("lido", "Dual governance approved", 15, UpgradeStatus::ApprovedNotDeployed),
    ] {
        store.upsert(r).await.expect("seed store");
    }
    api::router(AppState::new(store))
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    (status, String::from_utf8(bytes).expect("utf8"))
}

fn headlines(body: &str) -> Vec<String> {
    let v: Json = serde_json::from_str(body).expect("json body");
    v.as_array()
        .expect("array")
        .iter()
        .map(|r| r["headline"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let (status, body) = get(test_router().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.trim(), "ok");
}

#[tokio::test]
async fn api_upgrades_are_sorted_newest_first() {
    let (status, body) = get(test_router().await, "/upgrades").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headlines(&body),
        vec!["Aave v4 proposal", "Dual governance approved", "Lido V3 is live"]
    );

    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v[0]["status"], "proposal_only");
    assert!(v[0]["canonical_id"].is_string());
    assert!(v[0]["timestamp"].as_str().unwrap().starts_with("2024-04-20T00:00:00"));
}

#[tokio::test]
async fn api_upgrades_filter_by_project_and_status() {
    let (_, body) = get(test_router().await, "/upgrades?project=LIDO").await;
    assert_eq!(
        headlines(&body),
        vec!["Dual governance approved", "Lido V3 is live"]
    );

    let (_, body) = get(test_router().await, "/upgrades?project=lido&status=deployed_mainnet").await;
    assert_eq!(headlines(&body), vec!["Lido V3 is live"]);
}

#[tokio::test]
async fn api_upgrades_rejects_unknown_status() {
    let (status, body) = get(test_router().await, "/upgrades?status=moon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("moon"));
}

#[tokio::test]
async fn api_metrics_disabled_without_recorder() {
    let (status, _) = get(test_router().await, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_metrics_renders_prometheus_text_with_a_handle() {
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || {
        metrics::counter!("pipeline_runs_total").increment(3);
    });

    let store = Arc::new(MemoryOutputStore::new());
    let app = api::router(AppState::new(store).with_prometheus(handle));
    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("pipeline_runs_total 3"), "{body}");
}

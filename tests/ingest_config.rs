// tests/ingest_config.rs
//
// The shipped sample configs parse and wire up as expected.

use std::path::Path;
use std::sync::Arc;

use upgrade_monitor::config::AiConfig;
use upgrade_monitor::ingest::config::load_registry_from;
use upgrade_monitor::ingest::http::FixtureFetcher;
use upgrade_monitor::ingest::providers::{watchers_for, Credentials};
use upgrade_monitor::ingest::types::SourceKind;
use upgrade_monitor::source_weights::SourceWeights;

#[test]
fn sample_registry_loads_every_project() {
    let reg = load_registry_from(Path::new("config/source_registry.toml")).unwrap();
    let names: Vec<&str> = reg.projects.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["aave", "arbitrum", "lido", "uniswap"]);

    let uni = reg.project("uniswap").unwrap();
    assert_eq!(uni.name, "uniswap");
    assert_eq!(uni.primary_network(), "ethereum");
    assert!(reg.domain_allowlist.contains(&"lido".to_string()));
}

#[test]
fn sample_registry_yields_three_watchers_per_project() {
    let reg = load_registry_from(Path::new("config/source_registry.toml")).unwrap();
    let fetcher = Arc::new(FixtureFetcher::new());
    for p in reg.projects.values() {
        let ws = watchers_for(p, fetcher.clone(), &Credentials::default());
        let kinds: Vec<SourceKind> = ws.iter().map(|w| w.kind()).collect();
        assert_eq!(kinds, SourceKind::ALL.to_vec(), "project {}", p.name);
    }
}

#[test]
fn sample_weights_and_ai_config() {
    let w = SourceWeights::load_from_file("config/source_weights.json");
    assert_eq!(w, SourceWeights::default());

    let ai = AiConfig::load_or_default("config/ai.json");
    assert!(!ai.enabled);
    assert_eq!(ai.provider, "openai");
}

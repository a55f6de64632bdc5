// src/analyze/mod.rs
//! Judgment stages of a cycle: relevance filter, clustering, verification,
//! lifecycle status.

pub mod ai_adapter;
pub mod cluster;
pub mod delegated;
pub mod relevance;
pub mod status;
pub mod verify;

use std::sync::Arc;

pub use cluster::{cluster_events, default_window, DEFAULT_WINDOW_HOURS};
pub use delegated::{DelegatedOracle, DelegatedVerifier};
pub use relevance::{KeywordOracle, RelevanceOracle};
pub use status::resolve_status;
pub use verify::{Verifier, WeightedVerifier, DEFAULT_CONFIDENCE_THRESHOLD};

use crate::config::ai::AiConfig;
use crate::ingest::config::SourceRegistry;
use crate::source_weights::SourceWeights;

/// Pick the oracle/verifier pair: delegated judgment when enabled in the AI
/// config (or mocked via `AI_TEST_MODE=mock`), keyword + weighted otherwise.
pub fn build_judges(
    ai: &AiConfig,
    registry: &SourceRegistry,
    weights: SourceWeights,
    threshold: f32,
) -> (Arc<dyn RelevanceOracle>, Arc<dyn Verifier>) {
    let mocked = std::env::var("AI_TEST_MODE").map(|v| v == "mock").unwrap_or(false);
    if ai.enabled || mocked {
        let client = ai_adapter::build_client_from_config(ai);
        tracing::info!(target: "oracle", provider = client.provider_name(), "using delegated judgment");
        (
            Arc::new(DelegatedOracle::new(client.clone())),
            Arc::new(DelegatedVerifier::new(client, threshold)),
        )
    } else {
        tracing::info!(target: "oracle", "using keyword oracle and weighted verifier");
        (
            Arc::new(KeywordOracle::from_registry(registry)),
            Arc::new(WeightedVerifier::new(weights, threshold)),
        )
    }
}

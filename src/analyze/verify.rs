// src/analyze/verify.rs
//! Cluster verification: the `Verifier` seam and the weighted multi-source
//! heuristic.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::ingest::types::RawEvent;
use crate::model::{clamp01, excerpt, Evidence, UpgradeConfirmation};
use crate::source_weights::SourceWeights;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const LIVE_BONUS: f32 = 0.10;
pub const MULTI_SOURCE_BONUS: f32 = 0.10;
pub const EVIDENCE_EXCERPT_CHARS: usize = 100;

static LIVE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(live|activated)\b").unwrap());

/// Scores one cluster of events presumed to concern the same upgrade.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, cluster: &[RawEvent]) -> UpgradeConfirmation;
    fn name(&self) -> &'static str;
}

/// One evidence entry per event, in cluster order.
pub fn evidence_for(cluster: &[RawEvent]) -> Vec<Evidence> {
    cluster
        .iter()
        .map(|e| Evidence {
            kind: e.kind,
            url: e.url.clone(),
            description: excerpt(&e.text, EVIDENCE_EXCERPT_CHARS),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct WeightedVerifier {
    weights: SourceWeights,
    threshold: f32,
}

impl Default for WeightedVerifier {
    fn default() -> Self {
        Self::new(SourceWeights::default(), DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl WeightedVerifier {
    pub fn new(weights: SourceWeights, threshold: f32) -> Self {
        Self {
            weights,
            threshold: clamp01(threshold),
        }
    }

    /// Weighted score in [0, 1]. The first event of a kind adds its full
    /// (possibly bonused) weight, later events of that kind add half.
    pub fn score(&self, cluster: &[RawEvent]) -> f32 {
        let mut seen = HashSet::new();
        let mut score = 0.0_f32;
        for ev in cluster {
            let mut w = self.weights.weight_for(ev.kind);
            if LIVE_RE.is_match(&ev.text) {
                w += LIVE_BONUS;
            }
            if seen.insert(ev.kind) {
                score += w;
            } else {
                score += w * 0.5;
            }
        }
        if seen.len() >= 2 {
            score += MULTI_SOURCE_BONUS;
        }
        clamp01(score.min(1.0))
    }
}

#[async_trait]
impl Verifier for WeightedVerifier {
    async fn verify(&self, cluster: &[RawEvent]) -> UpgradeConfirmation {
        let score = self.score(cluster);
        let sources: Vec<String> = cluster
            .iter()
            .map(|e| format!("{}: {}", e.kind, e.author))
            .collect();
        UpgradeConfirmation {
            is_confirmed: score >= self.threshold,
            confidence: score,
            status_detected: None,
            evidence: evidence_for(cluster),
            reasoning: format!("Score {score:.2} from sources: {}", sources.join(", ")),
        }
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}

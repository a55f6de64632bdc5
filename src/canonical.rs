// src/canonical.rs
//! Merge a scored, classified cluster into one canonical upgrade record.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::ingest::config::ProjectConfig;
use crate::ingest::types::RawEvent;
use crate::model::{clamp01, AffectedSubtype, CanonicalUpgrade, UpgradeConfirmation, UpgradeStatus};

pub const HEADLINE_MAX_CHARS: usize = 120;

/// A blank line, with either line ending and stray whitespace on it.
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").unwrap());

/// Title-like segment of an event text: up to the first paragraph break,
/// whitespace-collapsed, hard-truncated with `...`.
pub fn headline(text: &str) -> String {
    let head = PARAGRAPH_BREAK.split(text).next().unwrap_or("");
    let collapsed = head.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= HEADLINE_MAX_CHARS {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(HEADLINE_MAX_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Build the canonical record.
///
/// `subtypes` maps event id → subtypes the oracle attached to that event.
/// The earliest event is the primary source; every other distinct URL is
/// supporting. The network comes from the project config.
pub fn canonicalize(
    cluster: &[RawEvent],
    confirmation: &UpgradeConfirmation,
    status: UpgradeStatus,
    subtypes: &HashMap<String, Vec<AffectedSubtype>>,
    project: &ProjectConfig,
) -> Result<CanonicalUpgrade, PipelineError> {
    let mut sorted: Vec<&RawEvent> = cluster.iter().collect();
    sorted.sort_by_key(|e| e.timestamp);
    let Some(primary) = sorted.first().copied() else {
        return Err(PipelineError::EmptyCluster {
            project: project.name.clone(),
        });
    };

    let mut seen_urls: HashSet<&str> = HashSet::from([primary.url.as_str()]);
    let supporting_sources = sorted
        .iter()
        .skip(1)
        .filter(|e| seen_urls.insert(e.url.as_str()))
        .map(|e| e.url.clone())
        .collect();

    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
    let affected_subtypes = sorted
        .iter()
        .filter_map(|e| subtypes.get(&e.id))
        .flatten()
        .filter(|s| seen_pairs.insert((s.subtype_code.clone(), s.impact_type.clone())))
        .cloned()
        .collect();

    let mut head = headline(&primary.text);
    if head.is_empty() {
        head = headline(&primary.url);
    }

    Ok(CanonicalUpgrade {
        canonical_id: Uuid::new_v4(),
        headline: head,
        project: primary.project.clone(),
        network: project.primary_network().to_string(),
        status,
        primary_source: primary.url.clone(),
        supporting_sources,
        timestamp: primary.timestamp,
        confidence: clamp01(confirmation.confidence),
        reasoning: confirmation.reasoning.clone(),
        affected_subtypes,
    })
}

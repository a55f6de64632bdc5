//! # Analysis & output model
//! Judgments produced over raw events and the durable canonical record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::ingest::types::SourceKind;

/// One claimed impact on a tokenized right (e.g. `payments` / `modified`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedSubtype {
    pub subtype_code: String,
    pub impact_type: String,
    /// Exact supporting quote or matched term.
    pub reason: String,
    #[serde(default = "default_subtype_confidence")]
    pub confidence: f32,
}

fn default_subtype_confidence() -> f32 {
    1.0
}

/// Relevance judgment over a single event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelevanceSignal {
    pub is_relevant: bool,
    #[serde(default)]
    pub affected_subtypes: Vec<AffectedSubtype>,
}

impl RelevanceSignal {
    /// Conservative default used whenever a judgment cannot be obtained.
    pub fn not_relevant() -> Self {
        Self::default()
    }
}

/// Compact projection of a raw event kept for audit trails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: SourceKind,
    pub url: String,
    pub description: String,
}

/// Verification verdict for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeConfirmation {
    pub is_confirmed: bool,
    pub confidence: f32,
    #[serde(default)]
    pub status_detected: Option<String>,
    pub evidence: Vec<Evidence>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    ProposalOnly,
    ApprovedNotDeployed,
    DeployedMainnet,
    Rejected,
}

impl UpgradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradeStatus::ProposalOnly => "proposal_only",
            UpgradeStatus::ApprovedNotDeployed => "approved_not_deployed",
            UpgradeStatus::DeployedMainnet => "deployed_mainnet",
            UpgradeStatus::Rejected => "rejected",
        }
    }

    /// Map free-text status from a judgment onto the enum. Accepts the
    /// snake_case names and a few loose spellings.
    pub fn from_detected(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "proposal_only" | "proposal" | "proposed" => Some(UpgradeStatus::ProposalOnly),
            "approved_not_deployed" | "approved" | "scheduled" => {
                Some(UpgradeStatus::ApprovedNotDeployed)
            }
            "deployed_mainnet" | "deployed" | "live" => Some(UpgradeStatus::DeployedMainnet),
            "rejected" | "cancelled" | "canceled" => Some(UpgradeStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for UpgradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable output unit. Identity is `(project, headline)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalUpgrade {
    pub canonical_id: Uuid,
    pub headline: String,
    pub project: String,
    pub network: String,
    pub status: UpgradeStatus,
    pub primary_source: String,
    pub supporting_sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default)]
    pub affected_subtypes: Vec<AffectedSubtype>,
}

impl CanonicalUpgrade {
    /// Dedup key in the output store: two records are the same upgrade when
    /// project and headline both match.
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.project, &self.headline)
    }

    /// Flat `<project>_<headline>` id written next to persisted records. Not
    /// unique on its own; stores compare `dedup_key`.
    pub fn identity_key(&self) -> String {
        identity_key(&self.project, &self.headline)
    }
}

pub fn identity_key(project: &str, headline: &str) -> String {
    format!("{project}_{headline}")
}

/// Clamp to [0.0, 1.0]; NaN maps to 0.0.
pub fn clamp01(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// First `max` chars of `text`, with `...` appended when something was cut.
pub fn excerpt(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&UpgradeStatus::ApprovedNotDeployed).unwrap();
        assert_eq!(s, "\"approved_not_deployed\"");
    }

    #[test]
    fn detected_status_parsing_reaches_rejected() {
        assert_eq!(
            UpgradeStatus::from_detected("Rejected"),
            Some(UpgradeStatus::Rejected)
        );
        assert_eq!(
            UpgradeStatus::from_detected("deployed mainnet"),
            Some(UpgradeStatus::DeployedMainnet)
        );
        assert_eq!(UpgradeStatus::from_detected("maybe"), None);
    }

    #[test]
    fn clamp01_handles_nan_and_bounds() {
        assert_eq!(clamp01(f32::NAN), 0.0);
        assert_eq!(clamp01(1.7), 1.0);
        assert_eq!(clamp01(-0.2), 0.0);
    }

    #[test]
    fn excerpt_marks_truncation() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("abcdef", 3), "abc...");
    }
}

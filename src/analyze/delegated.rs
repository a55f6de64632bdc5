// src/analyze/delegated.rs
//! Language-model backed relevance and verification judgments.
//!
//! Both sides degrade to the conservative default (not relevant / zero
//! confidence) whenever the client yields nothing or a malformed object.

use async_trait::async_trait;
use serde_json::Value;

use crate::analyze::ai_adapter::DynAiClient;
use crate::analyze::relevance::RelevanceOracle;
use crate::analyze::verify::{evidence_for, Verifier};
use crate::ingest::config::ProjectConfig;
use crate::ingest::types::RawEvent;
use crate::model::{clamp01, AffectedSubtype, RelevanceSignal, UpgradeConfirmation};

/// Tokenized-right subtypes a claimed impact may target.
pub const TAXONOMY: [&str; 6] = [
    "service_provision",
    "governance",
    "value_distribution",
    "membership",
    "payments",
    "collateral",
];

const RELEVANCE_RUBRIC: &str = "\
You classify announcements from crypto projects for changes to the rights a token confers.
Taxonomy of tokenized-right subtypes:
- service_provision: access to or usage of a protocol service
- governance: voting, proposal or treasury-control rights
- value_distribution: emissions, rewards, fee share, burns, yield
- membership: eligibility, allowlists, tiers
- payments: fees, gas, pricing paid by users
- collateral: staking, slashing, collateral or asset-ownership terms
Negative constraints: ignore UI or website changes, marketing, partnerships, exchange listings, price talk.
Every claimed impact MUST include the exact quote from the text that supports it.
Return JSON only:
{\"is_relevant\": bool, \"affected_subtypes\": [{\"subtype_code\": string, \"impact_type\": \"introduced\"|\"modified\"|\"removed\", \"quote\": string, \"confidence\": number}]}";

const VERIFICATION_RUBRIC: &str = "\
You verify whether a crypto protocol upgrade actually happened, using only the evidence given.
Checks: environment (mainnet vs testnet vs devnet); phrasing (success markers like 'is live', 'executed' vs intent markers like 'will', 'plan'); a concrete anchor (block number, transaction, release tag).
Score tiers:
- 1.0 confirmed_live: live on mainnet with success phrasing
- 0.8 scheduled: approved or scheduled with certainty
- 0.5 in_progress: voting, in progress, or testnet-only
- 0.1 speculative: rumor or discussion
- 0.0 irrelevant
Return JSON only:
{\"tier\": string, \"confidence\": number, \"status_detected\": \"proposal_only\"|\"approved_not_deployed\"|\"deployed_mainnet\"|\"rejected\"|null, \"reasoning\": string}";

pub struct DelegatedOracle {
    client: DynAiClient,
}

impl DelegatedOracle {
    pub fn new(client: DynAiClient) -> Self {
        Self { client }
    }
}

fn relevance_prompt(event: &RawEvent, project: &ProjectConfig) -> String {
    format!(
        "Project: {}\nProject tokens: {}\nSource kind: {}\nURL: {}\n\nText:\n{}",
        project.name,
        project.relevant_tokens.join(", "),
        event.kind,
        event.url,
        event.text
    )
}

/// Normalize a subtype code onto the taxonomy; `None` for unknown codes.
fn taxonomy_code(raw: &str) -> Option<&'static str> {
    let norm = raw.trim().to_ascii_lowercase().replace([' ', '-', '/'], "_");
    match norm.as_str() {
        "asset_ownership" | "collateral_asset_ownership" => Some("collateral"),
        other => TAXONOMY.iter().copied().find(|c| *c == other),
    }
}

/// Map a judgment object onto a signal. Claims without a quote, or outside
/// the taxonomy, are dropped.
pub fn parse_relevance(v: &Value) -> RelevanceSignal {
    let is_relevant = v.get("is_relevant").and_then(Value::as_bool).unwrap_or(false);
    if !is_relevant {
        return RelevanceSignal::not_relevant();
    }
    let claims = v
        .get("affected_subtypes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut affected_subtypes = Vec::new();
    for c in claims {
        let quote = c.get("quote").and_then(Value::as_str).map(str::trim).unwrap_or("");
        if quote.is_empty() {
            tracing::debug!(target: "oracle", claim = %c, "dropping claim without quote");
            continue;
        }
        let Some(code) = c.get("subtype_code").and_then(Value::as_str).and_then(taxonomy_code) else {
            tracing::debug!(target: "oracle", claim = %c, "dropping claim outside taxonomy");
            continue;
        };
        let impact = c
            .get("impact_type")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "modified".to_string());
        let confidence = c
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|f| clamp01(f as f32))
            .unwrap_or(1.0);
        affected_subtypes.push(AffectedSubtype {
            subtype_code: code.to_string(),
            impact_type: impact,
            reason: quote.to_string(),
            confidence,
        });
    }
    RelevanceSignal {
        is_relevant,
        affected_subtypes,
    }
}

#[async_trait]
impl RelevanceOracle for DelegatedOracle {
    async fn classify(&self, event: &RawEvent, project: &ProjectConfig) -> RelevanceSignal {
        match self
            .client
            .judge(RELEVANCE_RUBRIC, &relevance_prompt(event, project))
            .await
        {
            Some(v) => parse_relevance(&v),
            None => RelevanceSignal::not_relevant(),
        }
    }

    fn name(&self) -> &'static str {
        "delegated"
    }
}

/// Fixed confidence tiers of the verification rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTier {
    ConfirmedLive,
    Scheduled,
    InProgress,
    Speculative,
    Irrelevant,
}

impl ScoreTier {
    pub fn score(&self) -> f32 {
        match self {
            ScoreTier::ConfirmedLive => 1.0,
            ScoreTier::Scheduled => 0.8,
            ScoreTier::InProgress => 0.5,
            ScoreTier::Speculative => 0.1,
            ScoreTier::Irrelevant => 0.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "confirmed_live" | "live" => Some(ScoreTier::ConfirmedLive),
            "scheduled" | "approved" => Some(ScoreTier::Scheduled),
            "in_progress" | "testnet" | "voting" => Some(ScoreTier::InProgress),
            "speculative" | "rumor" => Some(ScoreTier::Speculative),
            "irrelevant" => Some(ScoreTier::Irrelevant),
            _ => None,
        }
    }
}

pub struct DelegatedVerifier {
    client: DynAiClient,
    threshold: f32,
}

impl DelegatedVerifier {
    pub fn new(client: DynAiClient, threshold: f32) -> Self {
        Self {
            client,
            threshold: clamp01(threshold),
        }
    }
}

fn verification_prompt(cluster: &[RawEvent]) -> String {
    cluster
        .iter()
        .map(|e| format!("Source ({}): {} (URL: {})", e.kind, e.text, e.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Map a verdict object onto a confirmation. An explicit numeric confidence
/// wins over the tier label; neither → zero.
pub fn parse_confirmation(v: Option<&Value>, cluster: &[RawEvent], threshold: f32) -> UpgradeConfirmation {
    let evidence = evidence_for(cluster);
    let Some(v) = v else {
        return UpgradeConfirmation {
            is_confirmed: false,
            confidence: 0.0,
            status_detected: None,
            evidence,
            reasoning: "delegated judgment unavailable".to_string(),
        };
    };
    let confidence = v
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|f| clamp01(f as f32))
        .or_else(|| {
            v.get("tier")
                .and_then(Value::as_str)
                .and_then(ScoreTier::parse)
                .map(|t| t.score())
        })
        .unwrap_or(0.0);
    let status_detected = v
        .get("status_detected")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let reasoning = v
        .get("reasoning")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("no reasoning provided")
        .to_string();
    UpgradeConfirmation {
        is_confirmed: confidence >= threshold,
        confidence,
        status_detected,
        evidence,
        reasoning,
    }
}

#[async_trait]
impl Verifier for DelegatedVerifier {
    async fn verify(&self, cluster: &[RawEvent]) -> UpgradeConfirmation {
        let v = self
            .client
            .judge(VERIFICATION_RUBRIC, &verification_prompt(cluster))
            .await;
        parse_confirmation(v.as_ref(), cluster, self.threshold)
    }

    fn name(&self) -> &'static str {
        "delegated"
    }
}

// src/analyze/relevance.rs
//! Relevance oracle seam plus the deterministic keyword implementation.
//!
//! An event is kept when it mentions an economic-impact or upgrade term AND
//! is about the crypto domain. Domain relevance is forced for allowlisted
//! projects and for text mentioning one of the project's token symbols.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::ingest::config::{ProjectConfig, SourceRegistry};
use crate::ingest::types::RawEvent;
use crate::model::{AffectedSubtype, RelevanceSignal};

/// Classifies a single event. Implementations never fail: anything that
/// prevents a judgment maps to [`RelevanceSignal::not_relevant`].
#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    async fn classify(&self, event: &RawEvent, project: &ProjectConfig) -> RelevanceSignal;
    fn name(&self) -> &'static str;
}

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(crypto\w*|blockchains?|ethereum|bitcoin|tokens?|defi|l1|l2|rollups?|on-?chain|validators?|smart contracts?|dao)\b",
    )
    .unwrap()
});

static UPGRADE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\b(upgrades?|upgraded|hard ?forks?|migrations?|v[2-9](\.\d+)*|activation|deploy\w*|releases?|updates?|patch\w*|proposals?)\b|\beip-\d+)",
    )
    .unwrap()
});

/// Economic vocabulary, grouped by the tokenized-right subtype it touches.
static ECONOMIC_TERMS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("payments", r"(?i)\b(fees?|gas|costs?|tax(es)?)\b"),
        ("collateral", r"(?i)\b(stak(e|es|ed|ing)|slash(ed|es|ing)?|collateral)\b"),
        (
            "value_distribution",
            r"(?i)\b(emissions?|inflation|yields?|rewards?|revenue|burn(s|ed|ing)?)\b",
        ),
        ("governance", r"(?i)\b(treasury|quorum|voting power)\b"),
    ]
    .into_iter()
    .map(|(code, pat)| (code, Regex::new(pat).unwrap()))
    .collect()
});

/// Heuristic confidence attached to keyword-derived subtypes.
const KEYWORD_SUBTYPE_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct KeywordOracle {
    domain_allowlist: HashSet<String>,
}

impl KeywordOracle {
    pub fn new<I, S>(allowlist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domain_allowlist: allowlist
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_registry(reg: &SourceRegistry) -> Self {
        Self::new(&reg.domain_allowlist)
    }

    fn domain_relevant(&self, text: &str, project: &ProjectConfig) -> bool {
        if self.domain_allowlist.contains(&project.name.to_ascii_lowercase()) {
            return true;
        }
        if mentions_token(text, &project.relevant_tokens) {
            return true;
        }
        DOMAIN_RE.is_match(text)
    }

    /// Pure, synchronous judgment; the trait impl simply delegates here.
    pub fn judge(&self, text: &str, project: &ProjectConfig) -> RelevanceSignal {
        let subtypes = economic_subtypes(text);
        let economic = !subtypes.is_empty();
        let upgrade = UPGRADE_RE.is_match(text);
        let is_relevant = (economic || upgrade) && self.domain_relevant(text, project);
        if !is_relevant {
            return RelevanceSignal::not_relevant();
        }
        RelevanceSignal {
            is_relevant,
            affected_subtypes: subtypes,
        }
    }
}

#[async_trait]
impl RelevanceOracle for KeywordOracle {
    async fn classify(&self, event: &RawEvent, project: &ProjectConfig) -> RelevanceSignal {
        self.judge(&event.text, project)
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

fn mentions_token(text: &str, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric() && c != '$')
        .map(|w| w.trim_start_matches('$'))
        .any(|w| !w.is_empty() && tokens.iter().any(|t| t.eq_ignore_ascii_case(w)))
}

/// One entry per subtype; the first matched term is the justification.
fn economic_subtypes(text: &str) -> Vec<AffectedSubtype> {
    ECONOMIC_TERMS
        .iter()
        .filter_map(|(code, re)| {
            re.find(text).map(|m| AffectedSubtype {
                subtype_code: (*code).to_string(),
                impact_type: "modified".to_string(),
                reason: m.as_str().to_string(),
                confidence: KEYWORD_SUBTYPE_CONFIDENCE,
            })
        })
        .collect()
}

// src/analyze/status.rs
//! Keyword lifecycle classification. Never yields `Rejected`; that state
//! only comes from an explicit negative confirmation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::UpgradeStatus;

static DEPLOYED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(live|activated|executed|deployed|mainnet|on-chain|successful(ly)?)\b")
        .unwrap()
});

static HEDGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(will be|planning|proposals?|planned|upcoming)\b").unwrap()
});

static APPROVED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(approved|passed|scheduled)\b").unwrap());

/// Resolve the lifecycle stage of a representative event text.
pub fn resolve_status(text: &str) -> UpgradeStatus {
    if DEPLOYED_RE.is_match(text) && !HEDGE_RE.is_match(text) {
        UpgradeStatus::DeployedMainnet
    } else if APPROVED_RE.is_match(text) {
        UpgradeStatus::ApprovedNotDeployed
    } else {
        UpgradeStatus::ProposalOnly
    }
}

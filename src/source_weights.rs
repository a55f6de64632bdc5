//! # Source Weights
//!
//! Base trust weight per channel kind, used by the weighted verifier.
//!
//! - Loads from JSON (`config/source_weights.json`), keys are kind names
//!   (`feed`, `code_release`, `social`, case-insensitive; SCREAMING_SNAKE
//!   spellings accepted).
//! - Values are clamped to `[0.0, 1.0]`.
//! - Missing kinds keep their built-in default; a missing or unparseable
//!   file falls back to the defaults entirely.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

use crate::ingest::types::SourceKind;
use crate::model::clamp01;

pub const DEFAULT_SOURCE_WEIGHTS_PATH: &str = "config/source_weights.json";

#[derive(Debug, Clone, PartialEq)]
pub struct SourceWeights {
    pub feed: f32,
    pub code_release: f32,
    pub social: f32,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            feed: 0.40,
            code_release: 0.35,
            social: 0.25,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourceWeightsFile {
    #[serde(default)]
    weights: HashMap<String, f32>,
}

impl SourceWeights {
    pub fn weight_for(&self, kind: SourceKind) -> f32 {
        match kind {
            SourceKind::Feed => self.feed,
            SourceKind::CodeRelease => self.code_release,
            SourceKind::Social => self.social,
        }
    }

    /// Load configuration from a JSON file. Falls back to defaults on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => Self::from_json(&s).unwrap_or_else(|e| {
                tracing::warn!(error = ?e, path = %path.display(), "bad source weights; using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let file: SourceWeightsFile = serde_json::from_str(s)?;
        let mut out = Self::default();
        for (k, w) in file.weights {
            let w = clamp01(w);
            match normalize(&k).as_str() {
                "feed" | "blog" => out.feed = w,
                "code_release" | "github" | "release" => out.code_release = w,
                "social" | "x" => out.social = w,
                other => tracing::warn!(kind = other, "unknown source kind in weights; ignored"),
            }
        }
        Ok(out)
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

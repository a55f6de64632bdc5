// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel kind an event was observed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Feed,
    CodeRelease,
    Social,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Feed, SourceKind::CodeRelease, SourceKind::Social];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::CodeRelease => "code_release",
            SourceKind::Social => "social",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized mention produced by a watcher. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEvent {
    pub id: String,
    pub project: String,
    pub kind: SourceKind,
    pub author: String,
    pub text: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl RawEvent {
    /// Build an event; the id is derived from (project, url) so re-polling the
    /// same item yields the same id.
    pub fn new(
        project: &str,
        kind: SourceKind,
        author: impl Into<String>,
        text: impl Into<String>,
        url: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let url = url.into();
        Self {
            id: event_id(project, &url),
            project: project.to_string(),
            kind,
            author: author.into(),
            text: text.into(),
            url,
            timestamp,
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = Some(raw);
        self
    }
}

fn event_id(project: &str, url: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(project.as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Stable identity of one watcher: project + watcher kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatcherId(String);

impl WatcherId {
    pub fn new(project: &str, kind: SourceKind) -> Self {
        Self(format!("{project}_{}", kind.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WatcherId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A source watcher. `poll` returns only events strictly newer than `cursor`
/// and never fails: sub-source errors are logged and yield fewer events.
/// The cursor is owned by the orchestrator and only read here.
#[async_trait::async_trait]
pub trait Watcher: Send + Sync {
    fn id(&self) -> &WatcherId;
    fn kind(&self) -> SourceKind;
    fn project(&self) -> &str;
    async fn poll(&self, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent>;
}

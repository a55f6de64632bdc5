// src/ingest/providers/github.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::sync::Arc;

use crate::ingest::config::ProjectConfig;
use crate::ingest::http::Fetcher;
use crate::ingest::types::{RawEvent, SourceKind, Watcher, WatcherId};
use crate::ingest::{compose_text, finalize_poll, newer_than, parse_timestamp};

pub const GITHUB_API: &str = "https://api.github.com";
const REPOS_PER_ORG: usize = 5;
const RELEASES_PER_REPO: usize = 10;

#[derive(Debug, Deserialize)]
struct Repo {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    name: Option<String>,
    tag_name: Option<String>,
    body: Option<String>,
    published_at: Option<String>,
    html_url: Option<String>,
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct Author {
    login: String,
}

/// Watches the releases of an organization's most recently pushed repos.
pub struct ReleaseWatcher {
    id: WatcherId,
    project: String,
    orgs: Vec<String>,
    fetcher: Arc<dyn Fetcher>,
    token: Option<String>,
    api_base: String,
}

impl ReleaseWatcher {
    pub fn new(project: &ProjectConfig, fetcher: Arc<dyn Fetcher>, token: Option<String>) -> Self {
        Self {
            id: WatcherId::new(&project.name, SourceKind::CodeRelease),
            project: project.name.clone(),
            orgs: project.github_orgs.clone(),
            fetcher,
            token,
            api_base: GITHUB_API.to_string(),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        let mut h = vec![("Accept", "application/vnd.github+json".to_string())];
        if let Some(t) = &self.token {
            h.push(("Authorization", format!("Bearer {t}")));
        }
        h
    }

    /// GET + JSON decode; any failure is logged and mapped to `None` so one
    /// org/repo never aborts its siblings.
    async fn get_json(&self, url: &str, scope: &str) -> Option<serde_json::Value> {
        let resp = match self.fetcher.get(url, &self.headers()).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, %url, scope, "github request failed");
                counter!("ingest_source_errors_total", "kind" => "code_release").increment(1);
                return None;
            }
        };
        if matches!(resp.status, 403 | 429) {
            tracing::warn!(target: "ingest", %url, scope, status = resp.status, "github rate limited");
            counter!("ingest_source_errors_total", "kind" => "code_release").increment(1);
            return None;
        }
        if !resp.is_success() {
            tracing::warn!(target: "ingest", %url, scope, status = resp.status, "github non-2xx");
            return None;
        }
        match serde_json::from_str(&resp.body) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, %url, scope, "github json parse failed");
                counter!("ingest_source_errors_total", "kind" => "code_release").increment(1);
                None
            }
        }
    }

    async fn repos(&self, org: &str) -> Vec<String> {
        let url = format!(
            "{}/orgs/{org}/repos?sort=pushed&direction=desc&per_page={REPOS_PER_ORG}",
            self.api_base
        );
        let Some(v) = self.get_json(&url, org).await else {
            return Vec::new();
        };
        match serde_json::from_value::<Vec<Repo>>(v) {
            Ok(repos) => repos.into_iter().map(|r| r.full_name).collect(),
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, org, "unexpected repo listing shape");
                Vec::new()
            }
        }
    }

    async fn releases(&self, full_name: &str, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        let url = format!(
            "{}/repos/{full_name}/releases?per_page={RELEASES_PER_REPO}",
            self.api_base
        );
        let Some(serde_json::Value::Array(items)) = self.get_json(&url, full_name).await else {
            return Vec::new();
        };
        items
            .into_iter()
            .filter_map(|raw| {
                let rel: Release = serde_json::from_value(raw.clone()).ok()?;
                let ts = rel.published_at.as_deref().and_then(parse_timestamp)?;
                if !newer_than(cursor, ts) {
                    return None;
                }
                let label = rel
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .or(rel.tag_name)
                    .unwrap_or_else(|| "unnamed".to_string());
                let text = compose_text(&format!("Release {label}"), rel.body.as_deref().unwrap_or(""));
                let url = rel
                    .html_url
                    .unwrap_or_else(|| format!("https://github.com/{full_name}/releases"));
                let author = rel.author.map(|a| a.login).unwrap_or_else(|| "unknown".into());
                Some(
                    RawEvent::new(&self.project, SourceKind::CodeRelease, author, text, url, ts)
                        .with_raw(raw),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Watcher for ReleaseWatcher {
    fn id(&self) -> &WatcherId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::CodeRelease
    }

    fn project(&self) -> &str {
        &self.project
    }

    async fn poll(&self, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        let t0 = std::time::Instant::now();
        let mut events = Vec::new();
        for org in &self.orgs {
            for repo in self.repos(org).await {
                events.extend(self.releases(&repo, cursor).await);
            }
        }
        // Ascending order: the orchestrator takes the last event as the new cursor.
        let out = finalize_poll(events, cursor);

        histogram!("ingest_poll_ms", "kind" => "code_release")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total", "kind" => "code_release").increment(out.len() as u64);
        out
    }
}

// src/ingest/providers/social.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::ingest::config::ProjectConfig;
use crate::ingest::http::Fetcher;
use crate::ingest::types::{RawEvent, SourceKind, Watcher, WatcherId};
use crate::ingest::{finalize_poll, newer_than, normalize_text, parse_timestamp};

pub const X_API: &str = "https://api.x.com";
/// Smallest page the timeline endpoint accepts.
const POSTS_PER_HANDLE: usize = 5;

#[derive(Debug, Deserialize)]
struct UserResp {
    data: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TimelineResp {
    #[serde(default)]
    data: Vec<Post>,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    text: String,
    created_at: Option<String>,
}

/// Watches recent non-reply posts of the project's social handles.
/// Without a bearer token it is a no-op.
pub struct SocialWatcher {
    id: WatcherId,
    project: String,
    handles: Vec<String>,
    fetcher: Arc<dyn Fetcher>,
    bearer: Option<String>,
    api_base: String,
    user_ids: Mutex<HashMap<String, String>>,
    warned_no_creds: AtomicBool,
}

impl SocialWatcher {
    pub fn new(project: &ProjectConfig, fetcher: Arc<dyn Fetcher>, bearer: Option<String>) -> Self {
        Self {
            id: WatcherId::new(&project.name, SourceKind::Social),
            project: project.name.clone(),
            handles: project.x_accounts.clone(),
            fetcher,
            bearer,
            api_base: X_API.to_string(),
            user_ids: Mutex::new(HashMap::new()),
            warned_no_creds: AtomicBool::new(false),
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str, bearer: &str) -> Option<T> {
        let headers = [("Authorization", format!("Bearer {bearer}"))];
        let resp = match self.fetcher.get(url, &headers).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, %url, "social request failed");
                counter!("ingest_source_errors_total", "kind" => "social").increment(1);
                return None;
            }
        };
        if !resp.is_success() {
            tracing::warn!(target: "ingest", %url, status = resp.status, "social non-2xx");
            counter!("ingest_source_errors_total", "kind" => "social").increment(1);
            return None;
        }
        serde_json::from_str(&resp.body)
            .map_err(|e| tracing::warn!(target: "ingest", error = ?e, %url, "social json parse failed"))
            .ok()
    }

    /// Handle → account id, cached for the life of the watcher.
    async fn user_id(&self, username: &str, bearer: &str) -> Option<String> {
        if let Some(id) = self.user_ids.lock().ok().and_then(|m| m.get(username).cloned()) {
            return Some(id);
        }
        let url = format!("{}/2/users/by/username/{username}", self.api_base);
        let resp: UserResp = self.get(&url, bearer).await?;
        let Some(user) = resp.data else {
            tracing::warn!(target: "ingest", username, "social account not found");
            return None;
        };
        if let Ok(mut m) = self.user_ids.lock() {
            m.insert(username.to_string(), user.id.clone());
        }
        Some(user.id)
    }

    async fn posts(&self, handle: &str, bearer: &str, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        let username = handle.trim_start_matches('@');
        let Some(user_id) = self.user_id(username, bearer).await else {
            return Vec::new();
        };
        let url = format!(
            "{}/2/users/{user_id}/tweets?max_results={POSTS_PER_HANDLE}&exclude=replies&tweet.fields=created_at,author_id",
            self.api_base
        );
        let Some(timeline) = self.get::<TimelineResp>(&url, bearer).await else {
            return Vec::new();
        };
        timeline
            .data
            .into_iter()
            .filter_map(|p| {
                let ts = p.created_at.as_deref().and_then(parse_timestamp)?;
                if !newer_than(cursor, ts) {
                    return None;
                }
                let url = format!("https://x.com/{username}/status/{}", p.id);
                let raw = serde_json::json!({ "id": p.id, "text": p.text });
                Some(
                    RawEvent::new(
                        &self.project,
                        SourceKind::Social,
                        handle,
                        normalize_text(&p.text),
                        url,
                        ts,
                    )
                    .with_raw(raw),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Watcher for SocialWatcher {
    fn id(&self) -> &WatcherId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Social
    }

    fn project(&self) -> &str {
        &self.project
    }

    async fn poll(&self, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        let Some(bearer) = self.bearer.as_deref() else {
            if !self.warned_no_creds.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    target: "ingest",
                    project = %self.project,
                    "no X_BEARER_TOKEN; social watcher disabled"
                );
            }
            return Vec::new();
        };

        let t0 = std::time::Instant::now();
        let mut events = Vec::new();
        for handle in &self.handles {
            events.extend(self.posts(handle, bearer, cursor).await);
        }
        let out = finalize_poll(events, cursor);

        histogram!("ingest_poll_ms", "kind" => "social").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total", "kind" => "social").increment(out.len() as u64);
        out
    }
}

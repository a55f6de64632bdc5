// src/ingest/providers/blog.rs
//! Blog watcher: per endpoint, structured feed → sitemap → listing-page scrape.
//! The first strategy that finds anything wins; later strategies are only
//! tried when every earlier one came back empty.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde_json::json;
use std::sync::Arc;

use crate::ingest::config::ProjectConfig;
use crate::ingest::feed::{parse_feed, parse_sitemap, FeedEntry, Sitemap, SitemapUrl};
use crate::ingest::http::Fetcher;
use crate::ingest::page;
use crate::ingest::types::{RawEvent, SourceKind, Watcher, WatcherId};
use crate::ingest::{compose_text, finalize_poll, newer_than, normalize_text, with_scheme};

/// Candidate feed paths, tried in order; the bare base URL comes last.
const FEED_PATHS: [&str; 5] = ["/feed", "/rss", "/rss.xml", "/feed.xml", "/index.xml"];
/// Article pages fetched per sitemap pass (most recent lastmod first).
const MAX_SITEMAP_PAGES: usize = 50;
/// Child sitemaps followed from a sitemap index.
const MAX_CHILD_SITEMAPS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Feed,
    Sitemap,
    Scrape,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Feed => "feed",
            Strategy::Sitemap => "sitemap",
            Strategy::Scrape => "scrape",
        }
    }
}

/// Outcome of one endpoint: which strategy resolved it (if any) and the
/// events it produced.
#[derive(Debug, Default)]
pub struct EndpointPoll {
    pub strategy: Option<Strategy>,
    pub events: Vec<RawEvent>,
}

pub struct BlogWatcher {
    id: WatcherId,
    project: String,
    endpoints: Vec<String>,
    fetcher: Arc<dyn Fetcher>,
}

impl BlogWatcher {
    pub fn new(project: &ProjectConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            id: WatcherId::new(&project.name, SourceKind::Feed),
            project: project.name.clone(),
            endpoints: project.blogs.clone(),
            fetcher,
        }
    }

    /// Run the fallback cascade for one endpoint.
    pub async fn poll_endpoint(&self, endpoint: &str, cursor: Option<DateTime<Utc>>) -> EndpointPoll {
        let base = with_scheme(endpoint);

        if let Some(events) = self.poll_feed(&base, cursor).await {
            return self.resolved(Strategy::Feed, &base, events);
        }
        tracing::debug!(target: "ingest", base = %base, "feed empty, trying sitemap");

        if let Some(events) = self.poll_sitemap(&base, cursor).await {
            return self.resolved(Strategy::Sitemap, &base, events);
        }
        tracing::debug!(target: "ingest", base = %base, "sitemap empty, trying listing page");

        let events = self.poll_listing(&base, cursor).await;
        if events.is_empty() {
            tracing::info!(
                target: "ingest",
                project = %self.project,
                base = %base,
                "all blog strategies came back empty"
            );
            return EndpointPoll::default();
        }
        self.resolved(Strategy::Scrape, &base, events)
    }

    fn resolved(&self, strategy: Strategy, base: &str, events: Vec<RawEvent>) -> EndpointPoll {
        counter!("ingest_strategy_hits_total", "strategy" => strategy.as_str()).increment(1);
        tracing::debug!(
            target: "ingest",
            project = %self.project,
            base = %base,
            strategy = strategy.as_str(),
            events = events.len(),
            "blog endpoint resolved"
        );
        EndpointPoll {
            strategy: Some(strategy),
            events,
        }
    }

    /// GET `url` and return the body on 2xx. Failures are logged and counted.
    async fn fetch_ok(&self, url: &str, stage: &'static str) -> Option<String> {
        match self.fetcher.get(url, &[]).await {
            Ok(resp) if resp.is_success() => Some(resp.body),
            Ok(resp) => {
                tracing::debug!(target: "ingest", %url, status = resp.status, stage, "non-2xx");
                None
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, %url, stage, "fetch failed");
                counter!("ingest_source_errors_total", "kind" => "feed", "stage" => stage)
                    .increment(1);
                None
            }
        }
    }

    /// `Some` as soon as one candidate path parses as a feed with at least one
    /// entry, even when every entry is older than the cursor.
    async fn poll_feed(&self, base: &str, cursor: Option<DateTime<Utc>>) -> Option<Vec<RawEvent>> {
        let candidates = FEED_PATHS
            .iter()
            .map(|p| format!("{base}{p}"))
            .chain(std::iter::once(base.to_string()));

        for url in candidates {
            let Some(body) = self.fetch_ok(&url, "feed").await else {
                continue;
            };
            let entries = match parse_feed(&body) {
                Ok(entries) if !entries.is_empty() => entries,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(target: "ingest", error = ?e, %url, "not a feed");
                    continue;
                }
            };
            let events = entries
                .into_iter()
                .filter_map(|e| self.feed_event(e, cursor))
                .collect();
            return Some(events);
        }
        None
    }

    fn feed_event(&self, entry: FeedEntry, cursor: Option<DateTime<Utc>>) -> Option<RawEvent> {
        let ts = entry.timestamp()?;
        if !newer_than(cursor, ts) {
            return None;
        }
        let url = entry.link.clone()?;
        let text = compose_text(&entry.title, &entry.summary);
        if text.is_empty() {
            return None;
        }
        let raw = json!({
            "strategy": "feed",
            "title": entry.title,
            "published": entry.published.map(|t| t.to_rfc3339()),
            "updated": entry.updated.map(|t| t.to_rfc3339()),
        });
        Some(
            RawEvent::new(
                &self.project,
                SourceKind::Feed,
                entry.author.unwrap_or_else(|| "unknown".to_string()),
                text,
                url,
                ts,
            )
            .with_raw(raw),
        )
    }

    /// `Some` when a sitemap listed at least one dated URL and, if any were
    /// newer than the cursor, at least one of their pages could be fetched.
    async fn poll_sitemap(&self, base: &str, cursor: Option<DateTime<Utc>>) -> Option<Vec<RawEvent>> {
        let urls = self.sitemap_urls(base).await;
        let mut dated: Vec<(String, DateTime<Utc>)> = urls
            .into_iter()
            .filter_map(|u| u.lastmod.map(|m| (u.loc, m)))
            .collect();
        if dated.is_empty() {
            return None;
        }

        dated.retain(|(_, lastmod)| newer_than(cursor, *lastmod));
        dated.sort_by(|a, b| b.1.cmp(&a.1));
        dated.truncate(MAX_SITEMAP_PAGES);

        let wanted = dated.len();
        let mut fetched = 0;
        let mut events = Vec::with_capacity(wanted);
        for (loc, lastmod) in dated {
            let Some(html) = self.fetch_ok(&loc, "page").await else {
                continue;
            };
            fetched += 1;
            if let Some(ev) = self.page_event(&loc, &html, lastmod, cursor) {
                events.push(ev);
            }
        }
        if wanted > 0 && fetched == 0 {
            tracing::debug!(target: "ingest", base = %base, pages = wanted, "no sitemap page could be fetched");
            return None;
        }
        Some(events)
    }

    async fn sitemap_urls(&self, base: &str) -> Vec<SitemapUrl> {
        let url = format!("{base}/sitemap.xml");
        let Some(body) = self.fetch_ok(&url, "sitemap").await else {
            return Vec::new();
        };
        match parse_sitemap(&body) {
            Ok(Sitemap::Urls(urls)) => urls,
            Ok(Sitemap::Index(children)) => {
                let mut out = Vec::new();
                for child in children.iter().take(MAX_CHILD_SITEMAPS) {
                    let Some(body) = self.fetch_ok(child, "sitemap").await else {
                        continue;
                    };
                    if let Ok(Sitemap::Urls(urls)) = parse_sitemap(&body) {
                        out.extend(urls);
                    }
                }
                out
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, %url, "sitemap parse failed");
                counter!("ingest_source_errors_total", "kind" => "feed", "stage" => "sitemap")
                    .increment(1);
                Vec::new()
            }
        }
    }

    /// One article page; text = title + meta description. The sitemap
    /// lastmod is often a rebuild time, so the publish date is recovered from
    /// the page and only falls back to lastmod.
    fn page_event(
        &self,
        url: &str,
        html: &str,
        lastmod: DateTime<Utc>,
        cursor: Option<DateTime<Utc>>,
    ) -> Option<RawEvent> {
        let title = page::page_title(html).unwrap_or_else(|| url.to_string());
        let desc = page::meta_description(html).unwrap_or_default();
        let ts = page::recover_publish_date(html, Some(lastmod)).unwrap_or(lastmod);
        if !newer_than(cursor, ts) {
            tracing::debug!(target: "ingest", %url, published = %ts, "page older than cursor");
            return None;
        }
        let raw = json!({ "strategy": "sitemap", "lastmod": lastmod.to_rfc3339() });
        Some(
            RawEvent::new(
                &self.project,
                SourceKind::Feed,
                "unknown",
                compose_text(&title, &desc),
                url,
                ts,
            )
            .with_raw(raw),
        )
    }

    /// Last resort: repeated content blocks on the root page. Blocks without a
    /// machine-readable time are stamped "now".
    async fn poll_listing(&self, base: &str, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        let Some(html) = self.fetch_ok(base, "scrape").await else {
            return Vec::new();
        };
        let now = Utc::now();
        page::content_blocks(&html)
            .into_iter()
            .filter_map(|b| {
                let ts = b.time.unwrap_or(now);
                if !newer_than(cursor, ts) {
                    return None;
                }
                let text = normalize_text(&b.title);
                if text.is_empty() {
                    return None;
                }
                Some(
                    RawEvent::new(
                        &self.project,
                        SourceKind::Feed,
                        "unknown",
                        text,
                        page::resolve_link(base, &b.href),
                        ts,
                    )
                    .with_raw(json!({ "strategy": "scrape", "html_snippet": b.snippet })),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Watcher for BlogWatcher {
    fn id(&self) -> &WatcherId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Feed
    }

    fn project(&self) -> &str {
        &self.project
    }

    async fn poll(&self, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
        let t0 = std::time::Instant::now();
        let mut all = Vec::new();
        for endpoint in &self.endpoints {
            let res = self.poll_endpoint(endpoint, cursor).await;
            all.extend(res.events);
        }
        let out = finalize_poll(all, cursor);

        histogram!("ingest_poll_ms", "kind" => "feed").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_events_total", "kind" => "feed").increment(out.len() as u64);
        out
    }
}

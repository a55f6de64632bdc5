// src/ingest/http.rs
//! Network seam for watchers. Production goes through `reqwest`; tests plug in
//! `FixtureFetcher` with canned bodies keyed by URL.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const USER_AGENT: &str = "crypto-upgrade-monitor/0.1";

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<FetchResponse>;
}

/// `reqwest`-backed fetcher; every call is bounded by the client timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<FetchResponse> {
        let mut req = self.client.get(url);
        for (k, v) in headers {
            req = req.header(*k, v);
        }
        let resp = req.send().await.with_context(|| format!("GET {url}"))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))?;
        Ok(FetchResponse { status, body })
    }
}

/// In-memory fetcher for tests and offline runs. Unknown URLs answer 404;
/// URLs registered with `fail` return a transport error. Every requested URL
/// is recorded in order.
#[derive(Default)]
pub struct FixtureFetcher {
    routes: Mutex<HashMap<String, FixtureRoute>>,
    pub requests: Mutex<Vec<String>>,
}

enum FixtureRoute {
    Body(u16, String),
    Fail,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, body: &str) -> Self {
        self.set(url, 200, body);
        self
    }

    pub fn with_status(self, url: &str, status: u16, body: &str) -> Self {
        self.set(url, status, body);
        self
    }

    pub fn fail(self, url: &str) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), FixtureRoute::Fail);
        }
        self
    }

    /// Replace or add a route after construction.
    pub fn set(&self, url: &str, status: u16, body: &str) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(url.to_string(), FixtureRoute::Body(status, body.to_string()));
        }
    }

    pub fn requested(&self, url: &str) -> bool {
        self.requests
            .lock()
            .map(|r| r.iter().any(|u| u == url))
            .unwrap_or(false)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Fetcher for FixtureFetcher {
    async fn get(&self, url: &str, _headers: &[(&'static str, String)]) -> Result<FetchResponse> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(url.to_string());
        }
        let routes = self
            .routes
            .lock()
            .map_err(|_| anyhow!("fixture routes poisoned"))?;
        match routes.get(url) {
            Some(FixtureRoute::Body(status, body)) => Ok(FetchResponse {
                status: *status,
                body: body.clone(),
            }),
            Some(FixtureRoute::Fail) => Err(anyhow!("fixture transport failure for {url}")),
            None => Ok(FetchResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_fetcher_routes_and_records() {
        let f = FixtureFetcher::new()
            .with("https://a/feed", "<rss/>")
            .fail("https://a/boom");

        let ok = f.get("https://a/feed", &[]).await.unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.body, "<rss/>");

        let missing = f.get("https://a/none", &[]).await.unwrap();
        assert_eq!(missing.status, 404);

        assert!(f.get("https://a/boom", &[]).await.is_err());
        assert_eq!(f.request_count(), 3);
        assert!(f.requested("https://a/none"));
    }
}

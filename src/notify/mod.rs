// src/notify/mod.rs
//! Alerts for newly stored canonical upgrades. Delivery failures are logged
//! and never affect the cycle.

pub mod discord;
pub mod slack;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::CanonicalUpgrade;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, record: &CanonicalUpgrade) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// One-line summary shared by the webhook sinks.
pub fn summary_line(r: &CanonicalUpgrade) -> String {
    format!(
        "[{}] {} | {} ({:.2})",
        r.project, r.headline, r.status, r.confidence
    )
}

/// Fans a record out to every configured sink.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slack via `SLACK_WEBHOOK_URL`, Discord via `DISCORD_WEBHOOK_URL`.
    /// No variables → no sinks.
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        let mut mux = Self::new();
        if let Some(url) = var("SLACK_WEBHOOK_URL") {
            mux = mux.with(Box::new(slack::SlackNotifier::new(url)));
        }
        if let Some(url) = var("DISCORD_WEBHOOK_URL") {
            mux = mux.with(Box::new(discord::DiscordNotifier::new(url)));
        }
        mux
    }

    pub fn with(mut self, sink: Box<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl Notifier for NotifierMux {
    async fn send(&self, record: &CanonicalUpgrade) -> Result<()> {
        for sink in &self.sinks {
            if let Err(e) = sink.send(record).await {
                tracing::warn!(
                    target: "pipeline",
                    sink = sink.name(),
                    error = ?e,
                    headline = %record.headline,
                    "notification failed"
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}

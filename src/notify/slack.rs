use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{summary_line, Notifier};
use crate::model::CanonicalUpgrade;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

pub(crate) fn slack_text(r: &CanonicalUpgrade) -> String {
    format!(
        "*Upgrade detected:* {}\nSource: {}\n@ {}",
        summary_line(r),
        r.primary_source,
        r.timestamp.to_rfc3339()
    )
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, r: &CanonicalUpgrade) -> Result<()> {
        let body = serde_json::json!({ "text": slack_text(r) });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

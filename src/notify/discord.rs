use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::Notifier;
use crate::model::CanonicalUpgrade;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

fn payload(r: &CanonicalUpgrade) -> DiscordWebhookPayload {
    let title = format!("{}: {}", r.project, r.headline);
    let supporting = if r.supporting_sources.is_empty() {
        "none".to_string()
    } else {
        r.supporting_sources.join("\n")
    };
    let description = format!(
        "**Status:** {}\n**Confidence:** {:.0}%\n**Network:** {}\n**Source:** {}\n**Supporting:** {}\n**Time (UTC):** {}",
        r.status,
        r.confidence * 100.0,
        r.network,
        r.primary_source,
        supporting,
        r.timestamp.to_rfc3339()
    );
    DiscordWebhookPayload::embed(&title, &description)
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, r: &CanonicalUpgrade) -> Result<()> {
        let payload = payload(r);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.chars().take(256).collect(),
                description: description.to_string(),
            }],
        }
    }
}

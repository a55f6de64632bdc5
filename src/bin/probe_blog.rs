//! Reports which strategy (feed, sitemap, scrape) a blog endpoint resolves to
//! and the events it would emit on a first poll.
//!
//! Usage: `probe_blog <endpoint> [<endpoint> ...]`

use std::sync::Arc;
use std::time::Duration;

use upgrade_monitor::ingest::config::ProjectConfig;
use upgrade_monitor::ingest::http::HttpFetcher;
use upgrade_monitor::ingest::providers::blog::BlogWatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let endpoints: Vec<String> = std::env::args().skip(1).collect();
    if endpoints.is_empty() {
        anyhow::bail!("usage: probe_blog <endpoint> [<endpoint> ...]");
    }

    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(20))?);
    let project = ProjectConfig {
        name: "probe".into(),
        blogs: endpoints.clone(),
        ..Default::default()
    };
    let watcher = BlogWatcher::new(&project, fetcher);

    for ep in &endpoints {
        let res = watcher.poll_endpoint(ep, None).await;
        let strategy = res.strategy.map(|s| s.as_str()).unwrap_or("none");
        println!("{ep}: strategy={strategy} events={}", res.events.len());
        for ev in res.events.iter().rev().take(5) {
            println!("  {}  {}", ev.timestamp.to_rfc3339(), ev.url);
        }
    }
    Ok(())
}

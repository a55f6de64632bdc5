// src/ingest/providers/mod.rs
pub mod blog;
pub mod github;
pub mod social;

use std::sync::Arc;

use crate::ingest::config::ProjectConfig;
use crate::ingest::http::Fetcher;
use crate::ingest::types::Watcher;

/// Credentials for the authenticated sources. Missing values degrade the
/// corresponding watcher rather than failing startup.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub x_bearer_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        let non_empty = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        Self {
            github_token: non_empty("GITHUB_TOKEN"),
            x_bearer_token: non_empty("X_BEARER_TOKEN"),
        }
    }
}

/// Build every watcher a project has channels for.
pub fn watchers_for(
    project: &ProjectConfig,
    fetcher: Arc<dyn Fetcher>,
    creds: &Credentials,
) -> Vec<Arc<dyn Watcher>> {
    let mut out: Vec<Arc<dyn Watcher>> = Vec::new();
    if !project.blogs.is_empty() {
        out.push(Arc::new(blog::BlogWatcher::new(project, fetcher.clone())));
    }
    if !project.github_orgs.is_empty() {
        out.push(Arc::new(github::ReleaseWatcher::new(
            project,
            fetcher.clone(),
            creds.github_token.clone(),
        )));
    }
    if !project.x_accounts.is_empty() {
        out.push(Arc::new(social::SocialWatcher::new(
            project,
            fetcher,
            creds.x_bearer_token.clone(),
        )));
    }
    out
}

// src/ingest/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

pub const ENV_REGISTRY_PATH: &str = "SOURCE_REGISTRY_PATH";

/// One tracked project and its public channels. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Filled from the registry key on load.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub relevant_tokens: Vec<String>,
    #[serde(default)]
    pub x_accounts: Vec<String>,
    #[serde(default)]
    pub blogs: Vec<String>,
    #[serde(default)]
    pub github_orgs: Vec<String>,
    /// Governance portal URLs (informational).
    #[serde(default)]
    pub governance: Vec<String>,
}

impl ProjectConfig {
    /// Network stamped on canonical records.
    pub fn primary_network(&self) -> &str {
        self.networks.first().map(String::as_str).unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRegistry {
    pub projects: BTreeMap<String, ProjectConfig>,
    /// Projects whose events are always domain-relevant for the keyword oracle.
    #[serde(default)]
    pub domain_allowlist: Vec<String>,
}

impl SourceRegistry {
    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.get(name)
    }
}

/// Load the registry from an explicit path. Supports TOML or JSON formats.
pub fn load_registry_from(path: &Path) -> Result<SourceRegistry> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading source registry from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_registry(&content, ext.as_str())
}

/// Load the registry using env var + fallbacks:
/// 1) $SOURCE_REGISTRY_PATH
/// 2) config/source_registry.toml
/// 3) config/source_registry.json
///
/// A missing or empty registry is an error: there is nothing to watch.
pub fn load_registry_default() -> Result<SourceRegistry> {
    if let Ok(p) = std::env::var(ENV_REGISTRY_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_registry_from(&pb);
        } else {
            return Err(anyhow!("SOURCE_REGISTRY_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/source_registry.toml");
    if toml_p.exists() {
        return load_registry_from(&toml_p);
    }
    let json_p = PathBuf::from("config/source_registry.json");
    if json_p.exists() {
        return load_registry_from(&json_p);
    }
    Err(anyhow!("no source registry found (config/source_registry.toml|json)"))
}

pub fn parse_registry(s: &str, hint_ext: &str) -> Result<SourceRegistry> {
    let parsed = if hint_ext == "json" {
        serde_json::from_str::<SourceRegistry>(s).context("parsing registry json")
    } else {
        match toml::from_str::<SourceRegistry>(s) {
            Ok(r) => Ok(r),
            Err(toml_err) => serde_json::from_str::<SourceRegistry>(s)
                .map_err(|_| anyhow!(toml_err))
                .context("parsing registry toml"),
        }
    }?;
    clean_registry(parsed)
}

fn clean_registry(mut reg: SourceRegistry) -> Result<SourceRegistry> {
    reg.projects.retain(|name, _| !name.trim().is_empty());
    if reg.projects.is_empty() {
        return Err(PipelineError::EmptyRegistry.into());
    }
    for (name, p) in reg.projects.iter_mut() {
        p.name = name.clone();
        p.networks = clean_list(std::mem::take(&mut p.networks));
        p.relevant_tokens = clean_list(std::mem::take(&mut p.relevant_tokens));
        p.x_accounts = clean_list(std::mem::take(&mut p.x_accounts));
        p.blogs = clean_list(std::mem::take(&mut p.blogs));
        p.github_orgs = clean_list(std::mem::take(&mut p.github_orgs));
        p.governance = clean_list(std::mem::take(&mut p.governance));
    }
    reg.domain_allowlist = clean_list(std::mem::take(&mut reg.domain_allowlist));
    Ok(reg)
}

/// Trim, drop empties and duplicates while keeping the configured order
/// (endpoint order decides which duplicate URL wins).
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const TOML: &str = r#"
domain_allowlist = ["ethereum", " "]

[projects.lido]
networks = ["ethereum"]
relevant_tokens = ["LDO", "stETH", "LDO"]
blogs = [" blog.lido.fi ", ""]
github_orgs = ["lidofinance"]
x_accounts = ["@LidoFinance"]
"#;

    #[test]
    fn toml_registry_is_cleaned_and_named() {
        let reg = parse_registry(TOML, "toml").unwrap();
        let lido = reg.project("lido").unwrap();
        assert_eq!(lido.name, "lido");
        assert_eq!(lido.blogs, vec!["blog.lido.fi".to_string()]);
        assert_eq!(lido.relevant_tokens, vec!["LDO".to_string(), "stETH".into()]);
        assert_eq!(lido.primary_network(), "ethereum");
        assert_eq!(reg.domain_allowlist, vec!["ethereum".to_string()]);
    }

    #[test]
    fn json_registry_parses() {
        let json = r#"{"projects": {"aave": {"github_orgs": ["aave"]}}}"#;
        let reg = parse_registry(json, "json").unwrap();
        assert_eq!(reg.project("aave").unwrap().primary_network(), "unknown");
    }

    #[test]
    fn empty_or_garbage_registry_is_rejected() {
        assert!(parse_registry("projects = {}", "toml").is_err());
        assert!(parse_registry("not a registry", "toml").is_err());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();
        env::remove_var(ENV_REGISTRY_PATH);

        // No files in temp CWD → error
        assert!(load_registry_default().is_err());

        // Env wins
        let p_json = tmp.path().join("registry.json");
        fs::write(&p_json, r#"{"projects": {"x": {"blogs": ["x.org"]}}}"#).unwrap();
        env::set_var(ENV_REGISTRY_PATH, p_json.display().to_string());
        let reg = load_registry_default().unwrap();
        assert!(reg.project("x").is_some());
        env::remove_var(ENV_REGISTRY_PATH);

        env::set_current_dir(&old).unwrap();
    }
}

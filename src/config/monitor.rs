// src/config/monitor.rs
//! Runtime knobs for the monitor, read from the environment (`.env` is
//! loaded by the binary first). Every value has a default and is clamped to
//! a sane range.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::analyze::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_WINDOW_HOURS};

pub const ENV_CONFIDENCE_THRESHOLD: &str = "CONFIDENCE_THRESHOLD";
pub const ENV_POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const ENV_CLUSTER_WINDOW_HOURS: &str = "CLUSTER_WINDOW_HOURS";
pub const ENV_POLL_CONCURRENCY: &str = "POLL_CONCURRENCY";
pub const ENV_POLL_TIMEOUT_SECS: &str = "POLL_TIMEOUT_SECS";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "HTTP_TIMEOUT_SECS";
pub const ENV_DATA_DIR: &str = "DATA_DIR";
pub const ENV_SOURCE_WEIGHTS_PATH: &str = "SOURCE_WEIGHTS_PATH";
pub const ENV_AI_CONFIG_PATH: &str = "AI_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Shared by the verifier verdict and the discard filter.
    pub confidence_threshold: f32,
    pub poll_interval_secs: u64,
    pub cluster_window_hours: i64,
    pub poll_concurrency: usize,
    pub poll_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub source_weights_path: PathBuf,
    pub ai_config_path: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            poll_interval_secs: 60,
            cluster_window_hours: DEFAULT_WINDOW_HOURS,
            poll_concurrency: 4,
            poll_timeout_secs: 120,
            http_timeout_secs: 20,
            data_dir: PathBuf::from("data"),
            source_weights_path: PathBuf::from(crate::source_weights::DEFAULT_SOURCE_WEIGHTS_PATH),
            ai_config_path: PathBuf::from(crate::config::ai::DEFAULT_AI_CONFIG_PATH),
        }
    }
}

// parse optional env value; unparseable → None (with a warning)
fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable env value");
            None
        }
    }
}

fn path_env(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            confidence_threshold: parse_env::<f32>(ENV_CONFIDENCE_THRESHOLD)
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0))
                .unwrap_or(d.confidence_threshold),
            poll_interval_secs: parse_env(ENV_POLL_INTERVAL_SECS)
                .map(|v: u64| v.clamp(5, 86_400))
                .unwrap_or(d.poll_interval_secs),
            cluster_window_hours: parse_env(ENV_CLUSTER_WINDOW_HOURS)
                .map(|v: i64| v.clamp(1, 24 * 30))
                .unwrap_or(d.cluster_window_hours),
            poll_concurrency: parse_env(ENV_POLL_CONCURRENCY)
                .map(|v: usize| v.clamp(1, 64))
                .unwrap_or(d.poll_concurrency),
            poll_timeout_secs: parse_env(ENV_POLL_TIMEOUT_SECS)
                .map(|v: u64| v.clamp(1, 3_600))
                .unwrap_or(d.poll_timeout_secs),
            http_timeout_secs: parse_env(ENV_HTTP_TIMEOUT_SECS)
                .map(|v: u64| v.clamp(1, 300))
                .unwrap_or(d.http_timeout_secs),
            data_dir: path_env(ENV_DATA_DIR).unwrap_or(d.data_dir),
            source_weights_path: path_env(ENV_SOURCE_WEIGHTS_PATH).unwrap_or(d.source_weights_path),
            ai_config_path: path_env(ENV_AI_CONFIG_PATH).unwrap_or(d.ai_config_path),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn cluster_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cluster_window_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    const KEYS: [&str; 9] = [
        ENV_CONFIDENCE_THRESHOLD,
        ENV_POLL_INTERVAL_SECS,
        ENV_CLUSTER_WINDOW_HOURS,
        ENV_POLL_CONCURRENCY,
        ENV_POLL_TIMEOUT_SECS,
        ENV_HTTP_TIMEOUT_SECS,
        ENV_DATA_DIR,
        ENV_SOURCE_WEIGHTS_PATH,
        ENV_AI_CONFIG_PATH,
    ];

    fn clear() {
        for k in KEYS {
            env::remove_var(k);
        }
    }

    #[serial_test::serial]
    #[test]
    fn defaults_without_env() {
        clear();
        let c = MonitorConfig::from_env();
        assert_eq!(c, MonitorConfig::default());
        assert!((c.confidence_threshold - 0.6).abs() < 1e-6);
        assert_eq!(c.cluster_window(), chrono::Duration::hours(24));
    }

    #[serial_test::serial]
    #[test]
    fn env_values_are_clamped_or_ignored() {
        clear();
        env::set_var(ENV_CONFIDENCE_THRESHOLD, "1.8");
        env::set_var(ENV_POLL_INTERVAL_SECS, "1");
        env::set_var(ENV_CLUSTER_WINDOW_HOURS, "48");
        env::set_var(ENV_POLL_CONCURRENCY, "zero");
        env::set_var(ENV_DATA_DIR, "/tmp/upgrades");
        let c = MonitorConfig::from_env();
        clear();

        assert_eq!(c.confidence_threshold, 1.0);
        assert_eq!(c.poll_interval_secs, 5);
        assert_eq!(c.cluster_window_hours, 48);
        assert_eq!(c.poll_concurrency, 4);
        assert_eq!(c.data_dir, PathBuf::from("/tmp/upgrades"));
    }
}

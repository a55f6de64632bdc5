//! AI adapter: provider abstraction + file cache + daily limit.
//!
//! Callers hand over a system rubric and a user prompt and get back a parsed
//! JSON object, or `None` when no usable judgment could be obtained (disabled,
//! over the daily limit, transport failure, malformed output).

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ai::AiConfig;
use crate::ingest::http::USER_AGENT;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Trait object used by the delegated oracle and verifier.
pub trait AiClient: Send + Sync {
    /// Ask for a JSON judgment. `None` means "no usable answer".
    fn judge<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynAiClient = Arc<dyn AiClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynAiClient {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockProvider::new(r#"{"is_relevant": false, "affected_subtypes": []}"#);
        return Arc::new(CachingClient::new(
            mock,
            PathBuf::from(&config.cache_dir),
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiProvider::new(config.api_key.clone(), config.model.as_deref()) {
            Ok(provider) => Arc::new(CachingClient::new(
                provider,
                PathBuf::from(&config.cache_dir),
                config.daily_limit,
            )),
            Err(e) => {
                tracing::warn!(target: "oracle", error = ?e, "openai client build failed; delegated judgment disabled");
                Arc::new(DisabledClient)
            }
        },
        other => {
            tracing::warn!(target: "oracle", provider = other, "unsupported ai provider; delegated judgment disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call and returns the raw model
/// output. Separated so the same caching wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

/// OpenAI provider (Chat Completions API in JSON mode).
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// `model_override`: defaults to gpt-4o-mini.
    pub fn new(api_key: String, model_override: Option<&str>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()?;
        let model = model_override.unwrap_or("gpt-4o-mini").to_string();
        Ok(Self {
            http,
            api_key,
            model,
        })
    }
}

impl Provider for OpenAiProvider {
    fn fetch<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return None;
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                response_format: Value,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: system,
                    },
                    Msg {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.0,
                response_format: serde_json::json!({ "type": "json_object" }),
            };

            let resp = match self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(target: "oracle", error = ?e, "openai request failed");
                    return None;
                }
            };

            if !resp.status().is_success() {
                tracing::warn!(target: "oracle", status = %resp.status(), "openai non-2xx");
                return None;
            }
            let body: Resp = resp.json().await.ok()?;
            body.choices.into_iter().next().map(|c| c.message.content)
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Returns `None` always; used when delegated judgment is disabled.
pub struct DisabledClient;

impl AiClient for DisabledClient {
    fn judge<'a>(
        &'a self,
        _system: &'a str,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Fixed-answer provider for tests/local runs. Counts real fetches.
pub struct MockProvider {
    pub fixed: String,
    pub calls: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(fixed: &str) -> Self {
        Self {
            fixed: fixed.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Provider for MockProvider {
    fn fetch<'a>(
        &'a self,
        _system: &'a str,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = self.fixed.clone();
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Mutex<DailyCounter>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        let counter = Mutex::new(load_daily_counter(&cache_dir).unwrap_or_default());
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    fn counter(&self) -> MutexGuard<'_, DailyCounter> {
        self.counter.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn judge_impl(&self, system: &str, prompt: &str) -> Option<Value> {
        // 1) Cache lookup; hits never count against the limit.
        let key = cache_key(system, prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return parse_json_object(&hit);
        }

        // 2) Daily limit (real calls only).
        {
            let mut g = self.counter();
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                tracing::debug!(target: "oracle", limit = self.daily_limit_max, "ai daily limit reached");
                return None;
            }
        }

        // 3) Real call.
        let raw = self.inner.fetch(system, prompt).await?;
        {
            let mut g = self.counter();
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        let parsed = parse_json_object(&raw);
        match &parsed {
            Some(_) => {
                let _ = write_cache_file(&self.cache_dir, &key, &raw);
            }
            None => tracing::warn!(target: "oracle", provider = self.inner.name(), "malformed ai response"),
        }
        parsed
    }
}

impl<P: Provider> AiClient for CachingClient<P> {
    fn judge<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>> {
        Box::pin(self.judge_impl(system, prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Extract one JSON object from model output. Tolerates code fences and a
/// top-level array (first object wins).
pub fn parse_json_object(raw: &str) -> Option<Value> {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest.trim_start_matches("json").trim_end_matches("```").trim();
    }
    match serde_json::from_str::<Value>(s).ok()? {
        v @ Value::Object(_) => Some(v),
        Value::Array(items) => items.into_iter().find(Value::is_object),
        _ => None,
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn cache_key(system: &str, prompt: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update(b"\n\n");
    hasher.update(prompt.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<String> {
    fs::read_to_string(cache_path(dir, key)).ok()
}

fn write_cache_file(dir: &Path, key: &str, raw: &str) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(raw.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let s = fs::read_to_string(counter_path(dir))?;
    serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}

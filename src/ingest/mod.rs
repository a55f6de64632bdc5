// src/ingest/mod.rs
pub mod config;
pub mod feed;
pub mod http;
pub mod page;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::RawEvent;
use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use std::collections::HashSet;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    Date, OffsetDateTime, PrimitiveDateTime,
};

/// Events returned by a watcher's first-ever poll.
pub const BOOTSTRAP_LIMIT: usize = 20;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_events_total", "Events emitted by watchers.");
        describe_counter!(
            "ingest_source_errors_total",
            "Transport/parse failures of a single sub-source."
        );
        describe_counter!(
            "ingest_strategy_hits_total",
            "Blog endpoints resolved per fallback strategy."
        );
        describe_counter!("pipeline_relevant_total", "Events kept by the oracle.");
        describe_counter!("pipeline_clusters_total", "Candidate clusters formed.");
        describe_counter!(
            "pipeline_discarded_total",
            "Clusters discarded below the confidence threshold."
        );
        describe_counter!("pipeline_upgrades_total", "New canonical upgrades stored.");
        describe_counter!(
            "pipeline_project_errors_total",
            "Projects aborted for a cycle on invariant violation."
        );
        describe_counter!("pipeline_runs_total", "Scheduled cycles completed.");
        describe_histogram!("ingest_poll_ms", "Watcher poll time in milliseconds.");
        describe_gauge!(
            "pipeline_last_run_ts",
            "Unix ts when the pipeline cycle last completed."
        );
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 4000 chars (release notes can be long)
    if out.chars().count() > 4000 {
        out = out.chars().take(4000).collect();
    }

    out
}

/// Title and body as one event text, separated by a paragraph break so the
/// canonicalizer can recover the title as headline.
pub fn compose_text(title: &str, body: &str) -> String {
    let t = normalize_text(title);
    let b = normalize_text(body);
    match (t.is_empty(), b.is_empty()) {
        (false, false) => format!("{t}\n\n{b}"),
        (false, true) => t,
        (true, false) => b,
        (true, true) => String::new(),
    }
}

/// Parse RFC 3339, RFC 2822, naive ISO datetime (assumed UTC) or a bare
/// `YYYY-MM-DD` date into a UTC timestamp.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return to_chrono(dt);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return to_chrono(dt);
    }
    if let Ok(fmt) = time::format_description::parse("[year]-[month]-[day]T[hour]:[minute]:[second]") {
        let head: String = s.chars().take(19).collect();
        if let Ok(p) = PrimitiveDateTime::parse(&head, &fmt) {
            return to_chrono(p.assume_utc());
        }
    }
    if let Ok(fmt) = time::format_description::parse("[year]-[month]-[day]") {
        if let Ok(d) = Date::parse(s, &fmt) {
            return to_chrono(d.midnight().assume_utc());
        }
    }
    // Obsolete RFC 822 zone names ("GMT", "EST") are common in older feeds.
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_chrono(dt: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond())
}

/// Keep only events strictly newer than `cursor`.
pub fn newer_than(cursor: Option<DateTime<Utc>>, ts: DateTime<Utc>) -> bool {
    cursor.map_or(true, |c| ts > c)
}

/// Shared tail of every watcher poll: drop duplicates by URL (first wins),
/// enforce the cursor, sort ascending and, on the bootstrap poll, keep only
/// the most recent `BOOTSTRAP_LIMIT` events.
pub fn finalize_poll(events: Vec<RawEvent>, cursor: Option<DateTime<Utc>>) -> Vec<RawEvent> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<RawEvent> = events
        .into_iter()
        .filter(|e| newer_than(cursor, e.timestamp))
        .filter(|e| seen.insert(e.url.clone()))
        .collect();

    out.sort_by_key(|e| e.timestamp);

    if cursor.is_none() && out.len() > BOOTSTRAP_LIMIT {
        tracing::debug!(
            target: "ingest",
            total = out.len(),
            limit = BOOTSTRAP_LIMIT,
            "bootstrap poll truncated to most recent events"
        );
        out = out.split_off(out.len() - BOOTSTRAP_LIMIT);
    }
    out
}

/// Prefix `https://` when the configured endpoint has no scheme.
pub fn with_scheme(endpoint: &str) -> String {
    let e = endpoint.trim();
    if e.starts_with("http://") || e.starts_with("https://") {
        e.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", e.trim_end_matches('/'))
    }
}

// src/ingest/page.rs
//! Regex-based HTML heuristics: page metadata, publish-date recovery and
//! repeated content blocks on listing pages.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashMap;

use crate::ingest::{normalize_text, parse_timestamp};

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static html regex"))
}

/// Parse `key="value"` / `key='value'` pairs from the inside of a tag.
/// Keys are lowercased; values are entity-decoded.
pub fn parse_attrs(tag_inner: &str) -> HashMap<String, String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let r = re(
        &RE,
        r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
    );
    let mut out = HashMap::new();
    for caps in r.captures_iter(tag_inner) {
        let key = caps[1].to_ascii_lowercase();
        let val = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| html_escape::decode_html_entities(m.as_str()).to_string())
            .unwrap_or_default();
        out.entry(key).or_insert(val);
    }
    out
}

/// Contents of `<title>`, normalized.
pub fn page_title(html: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let r = re(&RE, r"(?is)<title\b[^>]*>(.*?)</title>");
    r.captures(html)
        .map(|c| normalize_text(&c[1]))
        .filter(|t| !t.is_empty())
}

/// `content` of the first `<meta>` whose `name` or `property` equals `key`.
pub fn meta_content(html: &str, key: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let r = re(&RE, r"(?is)<meta\b([^>]*)>");
    r.captures_iter(html).find_map(|c| {
        let attrs = parse_attrs(&c[1]);
        let matches = attrs
            .get("name")
            .or_else(|| attrs.get("property"))
            .is_some_and(|v| v.eq_ignore_ascii_case(key));
        if matches {
            attrs.get("content").map(|v| v.trim().to_string())
        } else {
            None
        }
    })
}

/// Meta description, falling back to the OpenGraph description.
pub fn meta_description(html: &str) -> Option<String> {
    meta_content(html, "description")
        .or_else(|| meta_content(html, "og:description"))
        .filter(|d| !d.is_empty())
}

/// Visible body text: `<body>` contents (or the whole page), minus scripts
/// and styles, tags stripped.
pub fn body_text(html: &str) -> String {
    static RE_BODY: OnceCell<Regex> = OnceCell::new();
    static RE_NOISE: OnceCell<Regex> = OnceCell::new();
    let body = re(&RE_BODY, r"(?is)<body\b[^>]*>(.*)</body>")
        .captures(html)
        .map(|c| c.get(1).map_or("", |m| m.as_str()))
        .unwrap_or(html);
    let stripped = re(
        &RE_NOISE,
        r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<noscript\b[^>]*>.*?</noscript>",
    )
    .replace_all(body, " ");
    normalize_text(&stripped)
}

fn month_number(name: &str) -> Option<u32> {
    let n = name.to_ascii_lowercase();
    let key = if n.starts_with("sept") { "sep" } else { &n[..n.len().min(3)] };
    let full = [
        "january", "february", "march", "april", "may", "june", "july", "august", "september",
        "october", "november", "december",
    ];
    let idx = full.iter().position(|m| m.starts_with(key))?;
    // Accept the 3-letter abbreviation, "Sept", or the full name only.
    let canonical = full[idx];
    let ok = n.len() == 3 || n == "sept" || n == canonical;
    ok.then_some(idx as u32 + 1)
}

/// First well-formed `Month D, YYYY` date in document order. Article headers
/// precede the body, so the first hit is the publish date.
pub fn first_calendar_date(text: &str) -> Option<DateTime<Utc>> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let r = re(
        &RE,
        r"\b(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)([a-z]*)\.? (\d{1,2}), (\d{4})\b",
    );
    r.captures_iter(text).find_map(|c| {
        let month = month_number(&format!("{}{}", &c[1], &c[2]))?;
        let day: u32 = c[3].parse().ok()?;
        let year: i32 = c[4].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}

/// Best-effort publish date of an article page: body date pattern, then
/// `article:published_time`, then the caller's fallback.
pub fn recover_publish_date(html: &str, fallback: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    first_calendar_date(&body_text(html))
        .or_else(|| meta_content(html, "article:published_time").and_then(|v| parse_timestamp(&v)))
        .or(fallback)
}

/// One repeated content block found on a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentBlock {
    pub href: String,
    pub title: String,
    pub time: Option<DateTime<Utc>>,
    pub snippet: String,
}

/// Locate article-like blocks: `<article>` tags, then divs whose class looks
/// like post/entry/item/article, then elements with `role="article"`.
pub fn content_blocks(html: &str) -> Vec<ContentBlock> {
    static RE_ARTICLE: OnceCell<Regex> = OnceCell::new();
    static RE_CLASS: OnceCell<Regex> = OnceCell::new();
    static RE_ROLE: OnceCell<Regex> = OnceCell::new();

    let strategies = [
        re(&RE_ARTICLE, r"(?is)<article\b[^>]*>(.*?)</article>"),
        re(
            &RE_CLASS,
            r#"(?is)<div\b[^>]*\bclass\s*=\s*["'][^"']*(?:post|entry|item|article)[^"']*["'][^>]*>(.*?)</div>"#,
        ),
        re(
            &RE_ROLE,
            r#"(?is)<(?:div|li|section)\b[^>]*\brole\s*=\s*["']article["'][^>]*>(.*?)</(?:div|li|section)>"#,
        ),
    ];

    for r in strategies {
        let blocks: Vec<ContentBlock> = r
            .captures_iter(html)
            .filter_map(|c| block_from_inner(c.get(1).map_or("", |m| m.as_str())))
            .collect();
        if !blocks.is_empty() {
            return blocks;
        }
    }
    Vec::new()
}

fn block_from_inner(inner: &str) -> Option<ContentBlock> {
    static RE_A: OnceCell<Regex> = OnceCell::new();
    static RE_TIME: OnceCell<Regex> = OnceCell::new();

    let a = re(&RE_A, r"(?is)<a\b([^>]*)>(.*?)</a>").captures(inner)?;
    let href = parse_attrs(&a[1]).remove("href")?.trim().to_string();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }

    let link_text = normalize_text(&a[2]);
    let title = if link_text.is_empty() {
        normalize_text(inner).chars().take(200).collect()
    } else {
        link_text
    };

    let time = re(&RE_TIME, r"(?is)<time\b([^>]*)>")
        .captures(inner)
        .and_then(|c| parse_attrs(&c[1]).remove("datetime"))
        .and_then(|v| parse_timestamp(&v));

    Some(ContentBlock {
        href,
        title,
        time,
        snippet: inner.chars().take(500).collect(),
    })
}

/// Resolve `link` against the listing page `base`.
pub fn resolve_link(base: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    if let Some(rest) = link.strip_prefix("//") {
        let scheme = base.split("://").next().unwrap_or("https");
        return format!("{scheme}://{rest}");
    }
    let base = base.trim_end_matches('/');
    if link.starts_with('/') {
        let origin = match base.find("://") {
            Some(i) => match base[i + 3..].find('/') {
                Some(j) => &base[..i + 3 + j],
                None => base,
            },
            None => base,
        };
        return format!("{origin}{link}");
    }
    format!("{base}/{link}")
}

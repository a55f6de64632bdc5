// src/ingest/feed.rs
//! Syndication (RSS 2.0 / Atom) and sitemap XML parsing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::ingest::parse_timestamp;

/// One syndication entry, format-independent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl FeedEntry {
    /// Published time, falling back to updated time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.published.or(self.updated)
    }
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "date")]
    dc_date: Option<String>,
    description: Option<String>,
    author: Option<String>,
    #[serde(rename = "creator")]
    creator: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<TextNode>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<TextNode>,
    content: Option<TextNode>,
    author: Option<AtomAuthor>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: Option<String>,
}

fn text_of(node: Option<TextNode>) -> String {
    node.and_then(|n| n.value).unwrap_or_default()
}

/// Parse an RSS or Atom document. Returns an error when the body is neither.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let xml_clean = scrub_html_entities_for_xml(xml);

    if let Ok(rss) = from_str::<Rss>(&xml_clean) {
        return Ok(rss.channel.item.into_iter().map(rss_entry).collect());
    }

    let atom: AtomFeed = from_str(&xml_clean).context("parsing feed xml (rss/atom)")?;
    Ok(atom.entry.into_iter().map(atom_entry).collect())
}

fn rss_entry(it: Item) -> FeedEntry {
    FeedEntry {
        title: it.title.unwrap_or_default(),
        summary: it.description.unwrap_or_default(),
        link: it.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
        author: it.author.or(it.creator),
        published: it.pub_date.as_deref().and_then(parse_timestamp),
        updated: it.dc_date.as_deref().and_then(parse_timestamp),
    }
}

fn atom_entry(e: AtomEntry) -> FeedEntry {
    // Prefer rel="alternate" (or no rel), which is the human-readable page.
    let link = e
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| e.links.first())
        .and_then(|l| l.href.clone());
    let summary = {
        let s = text_of(e.summary);
        if s.trim().is_empty() {
            text_of(e.content)
        } else {
            s
        }
    };
    FeedEntry {
        title: text_of(e.title),
        summary,
        link,
        author: e.author.and_then(|a| a.name),
        published: e.published.as_deref().and_then(parse_timestamp),
        updated: e.updated.as_deref().and_then(parse_timestamp),
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}

// --- Sitemaps ---

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapUrl {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UrlSet {
    #[serde(rename = "url", default)]
    url: Vec<UrlTag>,
}

#[derive(Debug, Deserialize)]
struct UrlTag {
    loc: Option<String>,
    lastmod: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SitemapIndex {
    #[serde(rename = "sitemap", default)]
    sitemap: Vec<UrlTag>,
}

/// Parsed sitemap document: either page entries or child sitemap locations.
#[derive(Debug, Clone, PartialEq)]
pub enum Sitemap {
    Urls(Vec<SitemapUrl>),
    Index(Vec<String>),
}

pub fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let set: UrlSet = from_str(xml).context("parsing sitemap xml")?;
    if !set.url.is_empty() {
        let urls = set
            .url
            .into_iter()
            .filter_map(|u| {
                let loc = u.loc?.trim().to_string();
                if loc.is_empty() {
                    return None;
                }
                Some(SitemapUrl {
                    loc,
                    lastmod: u.lastmod.as_deref().and_then(parse_timestamp),
                })
            })
            .collect();
        return Ok(Sitemap::Urls(urls));
    }

    let index: SitemapIndex = from_str(xml).context("parsing sitemap index xml")?;
    let children = index
        .sitemap
        .into_iter()
        .filter_map(|s| s.loc.map(|l| l.trim().to_string()))
        .filter(|l| !l.is_empty())
        .collect();
    Ok(Sitemap::Index(children))
}

// src/store/mod.rs
//! Persistence seams: per-watcher cursors and the canonical output feed.

pub mod file;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ingest::types::WatcherId;
use crate::model::CanonicalUpgrade;

pub use file::{FileCursorStore, FileOutputStore};
pub use memory::{MemoryCursorStore, MemoryOutputStore};

/// Last-seen timestamp per watcher. Absence means "never polled".
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, id: &WatcherId) -> Option<DateTime<Utc>>;
    /// Monotonic: a value older than the stored one is ignored.
    async fn set(&self, id: &WatcherId, ts: DateTime<Utc>) -> Result<()>;
}

/// Canonical records keyed by `(project, headline)`.
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// `true` when inserted, `false` when the key already exists.
    async fn upsert(&self, record: CanonicalUpgrade) -> Result<bool>;
    async fn flush(&self) -> Result<()>;
    async fn all(&self) -> Vec<CanonicalUpgrade>;
}

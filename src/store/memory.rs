// src/store/memory.rs
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{CursorStore, OutputStore};
use crate::ingest::types::WatcherId;
use crate::model::CanonicalUpgrade;

#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, DateTime<Utc>>>,
    /// Accepted writes, in order.
    history: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, DateTime<Utc>> {
        self.cursors.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn history(&self) -> Vec<(String, DateTime<Utc>)> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, id: &WatcherId) -> Option<DateTime<Utc>> {
        self.cursors.lock().ok()?.get(id.as_str()).copied()
    }

    async fn set(&self, id: &WatcherId, ts: DateTime<Utc>) -> Result<()> {
        let mut m = self
            .cursors
            .lock()
            .map_err(|_| anyhow::anyhow!("cursor store lock poisoned"))?;
        let advanced = match m.get(id.as_str()) {
            Some(prev) if *prev >= ts => false,
            _ => {
                m.insert(id.as_str().to_string(), ts);
                true
            }
        };
        drop(m);
        if advanced {
            if let Ok(mut h) = self.history.lock() {
                h.push((id.as_str().to_string(), ts));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryOutputStore {
    records: Mutex<Vec<CanonicalUpgrade>>,
    flushes: AtomicUsize,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OutputStore for MemoryOutputStore {
    async fn upsert(&self, record: CanonicalUpgrade) -> Result<bool> {
        let mut recs = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("output store lock poisoned"))?;
        if recs.iter().any(|r| r.dedup_key() == record.dedup_key()) {
            return Ok(false);
        }
        recs.push(record);
        Ok(true)
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn all(&self) -> Vec<CanonicalUpgrade> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let s = MemoryCursorStore::new();
        let id = WatcherId::from("lido_feed");
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(s.get(&id).await.is_none());

        s.set(&id, t).await.unwrap();
        s.set(&id, t - Duration::days(1)).await.unwrap();
        s.set(&id, t).await.unwrap();
        assert_eq!(s.get(&id).await, Some(t));
        assert_eq!(s.history().len(), 1);
    }
}

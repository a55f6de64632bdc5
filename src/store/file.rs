// src/store/file.rs
//! JSON-file stores. Writes go through a temp file + rename so a crash never
//! leaves a half-written document; unreadable documents load as empty.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{CursorStore, OutputStore};
use crate::ingest::types::WatcherId;
use crate::model::CanonicalUpgrade;

pub const STATE_FILE: &str = "state.json";
pub const OUTPUT_FILE: &str = "upgrades.json";

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

/// `write_atomic` off the async worker threads.
async fn write_atomic_blocking(path: PathBuf, bytes: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .context("store write task")?
}

/// Read a JSON document; missing → `None`, unreadable → `None` + warn.
fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let s = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(target: "store", error = ?e, path = %path.display(), "unreadable store file; starting empty");
            return None;
        }
    };
    match serde_json::from_str(&s) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(target: "store", error = ?e, path = %path.display(), "corrupted store file; starting empty");
            None
        }
    }
}

/// Cursors as `{ "<watcher id>": "<rfc3339>" }`, rewritten on every advance.
/// The in-memory map only changes once the file write has succeeded.
pub struct FileCursorStore {
    path: PathBuf,
    cursors: tokio::sync::Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl FileCursorStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cursors = read_json(&path).unwrap_or_default();
        Self {
            path,
            cursors: tokio::sync::Mutex::new(cursors),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(STATE_FILE))
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self, id: &WatcherId) -> Option<DateTime<Utc>> {
        self.cursors.lock().await.get(id.as_str()).copied()
    }

    async fn set(&self, id: &WatcherId, ts: DateTime<Utc>) -> Result<()> {
        let mut m = self.cursors.lock().await;
        if matches!(m.get(id.as_str()), Some(prev) if *prev >= ts) {
            return Ok(());
        }
        let mut next = m.clone();
        next.insert(id.as_str().to_string(), ts);
        let json = serde_json::to_vec_pretty(&next)?;
        write_atomic_blocking(self.path.clone(), json).await?;
        *m = next;
        Ok(())
    }
}

/// On-disk shape: the record plus its identity key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredUpgrade {
    id: String,
    #[serde(flatten)]
    record: CanonicalUpgrade,
}

/// Canonical feed held in memory and written out on `flush`.
pub struct FileOutputStore {
    path: PathBuf,
    records: Mutex<Vec<CanonicalUpgrade>>,
}

impl FileOutputStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw: Vec<serde_json::Value> = read_json(&path).unwrap_or_default();
        let mut records: Vec<CanonicalUpgrade> = Vec::with_capacity(raw.len());
        for v in raw {
            match serde_json::from_value::<StoredUpgrade>(v) {
                Ok(s) if !records.iter().any(|r| r.dedup_key() == s.record.dedup_key()) => {
                    records.push(s.record)
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "store", error = ?e, path = %path.display(), "skipping unreadable record")
                }
            }
        }
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::open(dir.join(OUTPUT_FILE))
    }
}

#[async_trait]
impl OutputStore for FileOutputStore {
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
        let stored: Vec<StoredUpgrade> = {
            let recs = self
                .records
                .lock()
                .map_err(|_| anyhow::anyhow!("output store lock poisoned"))?;
            recs.iter()
                .map(|r| StoredUpgrade {
                    id: r.identity_key(),
                    record: r.clone(),
                })
                .collect()
        };
        let json = serde_json::to_vec_pretty(&stored)?;
        write_atomic_blocking(self.path.clone(), json).await
    }

    async fn all(&self) -> Vec<CanonicalUpgrade> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UpgradeStatus;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn record(headline: &str) -> CanonicalUpgrade {
        CanonicalUpgrade {
            canonical_id: Uuid::new_v4(),
            headline: headline.into(),
            project: "lido".into(),
            network: "ethereum".into(),
            status: UpgradeStatus::DeployedMainnet,
            primary_source: "https://blog.lido.fi/v3".into(),
            supporting_sources: vec![],
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            confidence: 0.75,
            reasoning: "Score 0.75".into(),
            affected_subtypes: vec![],
        }
    }

    #[tokio::test]
    async fn output_round_trips_through_disk_with_id_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::in_dir(dir.path());
        assert!(store.upsert(record("Lido v3 live")).await.unwrap());
        assert!(!store.upsert(record("Lido v3 live")).await.unwrap());
        store.flush().await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(OUTPUT_FILE)).unwrap()).unwrap();
        assert_eq!(raw[0]["id"], "lido_Lido v3 live");
        assert_eq!(raw[0]["status"], "deployed_mainnet");
        assert_eq!(raw[0]["timestamp"], "2024-05-01T00:00:00Z");

        let reopened = FileOutputStore::in_dir(dir.path());
        assert_eq!(reopened.all().await.len(), 1);
        assert!(!reopened.upsert(record("Lido v3 live")).await.unwrap());
    }

    #[tokio::test]
    async fn corrupted_files_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(OUTPUT_FILE), "[{not json").unwrap();
        fs::write(dir.path().join(STATE_FILE), "garbage").unwrap();

        let out = FileOutputStore::in_dir(dir.path());
        assert!(out.all().await.is_empty());
        let cur = FileCursorStore::in_dir(dir.path());
        assert!(cur.get(&WatcherId::from("lido_feed")).await.is_none());
    }

    #[tokio::test]
    async fn bad_records_are_skipped_individually() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_value(StoredUpgrade {
            id: "lido_A".into(),
            record: record("A"),
        })
        .unwrap();
        let doc = serde_json::json!([good, {"headline": 3}]);
        fs::write(dir.path().join(OUTPUT_FILE), doc.to_string()).unwrap();
        assert_eq!(FileOutputStore::in_dir(dir.path()).all().await.len(), 1);
    }

    #[tokio::test]
    async fn keys_with_underscores_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutputStore::in_dir(dir.path());
        let mut a = record("c");
        a.project = "a_b".into();
        let mut b = record("b_c");
        b.project = "a".into();
        assert_eq!(a.identity_key(), b.identity_key());

        assert!(store.upsert(a).await.unwrap());
        assert!(store.upsert(b).await.unwrap());
        store.flush().await.unwrap();
        assert_eq!(FileOutputStore::in_dir(dir.path()).all().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_cursor_write_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let s = FileCursorStore::open(blocker.join(STATE_FILE));
        let id = WatcherId::from("lido_feed");
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        assert!(s.set(&id, t).await.is_err());
        assert!(s.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn cursors_persist_and_stay_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let id = WatcherId::from("lido_feed");
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        {
            let s = FileCursorStore::in_dir(dir.path());
            s.set(&id, t).await.unwrap();
            s.set(&id, t - chrono::Duration::hours(1)).await.unwrap();
        }
        let s = FileCursorStore::in_dir(dir.path());
        assert_eq!(s.get(&id).await, Some(t));
    }
}

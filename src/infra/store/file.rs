//! File-backed state store using an append-only JSON lines log.
//!
//! Every `put` appends one record; the log is replayed on open with the last
//! write per key winning. Expiry uses wall-clock time so it survives restarts.
//! Appends run on tokio's blocking pool so a slow disk never stalls the
//! runtime's worker threads.

use std::collections::HashMap;
use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::StoreError;
use crate::core::store::StateStore;
use crate::util::clock::now_ms;

/// One persisted log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Record {
    key: String,
    value: Value,
    expires_at_ms: Option<u64>,
}

impl Record {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at_ms.is_none_or(|at| now < at)
    }
}

/// File-backed store using JSON lines for durability.
pub struct FileStore {
    inner: Arc<Log>,
}

struct Log {
    path: PathBuf,
    stream: String,
    /// Held across the disk append so the log order matches the map.
    entries: Mutex<HashMap<String, Record>>,
}

impl FileStore {
    /// Open (or create) a store persisted to `path/<stream>.jsonl`.
    ///
    /// Replays the log synchronously; call it before serving traffic.
    pub fn open(path: impl AsRef<Path>, stream: impl Into<String>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path)?;
        let log = Log {
            path,
            stream: stream.into(),
            entries: Mutex::new(HashMap::new()),
        };
        log.load_from_disk()?;
        Ok(Self {
            inner: Arc::new(log),
        })
    }

    /// Rewrite the log with only live entries. Returns the number kept.
    ///
    /// Blocks on file IO; run it from a maintenance task, not a request path.
    pub fn compact(&self) -> Result<usize, StoreError> {
        self.inner.compact()
    }
}

impl Log {
    fn file_path(&self) -> PathBuf {
        self.path.join(format!("{}.jsonl", self.stream))
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        let file_path = self.file_path();
        if !file_path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new().read(true).open(&file_path)?;
        let reader = BufReader::new(file);
        let now = now_ms();
        let mut entries = self.entries.lock();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line)?;
            if record.is_live(now) {
                entries.insert(record.key.clone(), record);
            } else {
                entries.remove(&record.key);
            }
        }
        tracing::debug!(path = %file_path.display(), keys = entries.len(), "state store loaded");
        Ok(())
    }

    fn insert(&self, record: Record) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        self.append_to_disk(&record)?;
        entries.insert(record.key.clone(), record);
        Ok(())
    }

    fn append_to_disk(&self, record: &Record) -> Result<(), StoreError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path())?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn compact(&self) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut entries = self.entries.lock();
        entries.retain(|_, record| record.is_live(now));

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.file_path())?;
        for record in entries.values() {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{line}")?;
        }
        Ok(entries.len())
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn put(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at_ms = ttl.map(|ttl| {
            now_ms().saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
        });
        let record = Record {
            key: key.to_string(),
            value,
            expires_at_ms,
        };
        let log = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || log.insert(record))
            .await
            .map_err(|err| StoreError::Unavailable(format!("store write task failed: {err}")))?
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = now_ms();
        Ok(self
            .inner
            .entries
            .lock()
            .get(key)
            .filter(|record| record.is_live(now))
            .map(|record| record.value.clone()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = now_ms();
        let mut keys: Vec<String> = self
            .inner
            .entries
            .lock()
            .values()
            .filter(|record| record.key.starts_with(prefix) && record.is_live(now))
            .map(|record| record.key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

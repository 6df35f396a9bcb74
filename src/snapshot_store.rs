use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o failed for {key}: {source}")]
    Io {
        key: String,
        source: std::io::Error,
    },
    #[error("record for {key} is malformed: {source}")]
    Malformed {
        key: String,
        source: serde_json::Error,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value collaborator holding session snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn del(&self, key: &str) -> Result<(), StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Clone, Debug)]
struct MemoryEntry {
    value: String,
    expires_at_ms: u64,
}

/// In-process store. Expired entries are dropped when read.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, MemoryEntry>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let entry = MemoryEntry {
            value: value.to_string(),
            expires_at_ms: expires_at_ms(ttl_secs),
        };
        self.lock()?.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.lock()?;
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if entry.expires_at_ms <= now_ms() {
            entries.remove(key);
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredRecord {
    value: String,
    #[serde(rename = "expiresAtMs")]
    expires_at_ms: u64,
    #[serde(rename = "savedAt")]
    saved_at: String,
}

/// One JSON record per key under `dir`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_name}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_error)?;

        let record = StoredRecord {
            value: value.to_string(),
            expires_at_ms: expires_at_ms(ttl_secs),
            saved_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let text = serde_json::to_string(&record).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })?;
        tokio::fs::write(self.path_for(key), text)
            .await
            .map_err(io_error)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let record: StoredRecord =
            serde_json::from_str(&text).map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            })?;
        if record.expires_at_ms <= now_ms() {
            self.del(key).await?;
            return Ok(None);
        }
        Ok(Some(record.value))
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Io {
                key: self.dir.display().to_string(),
                source,
            })
    }
}

#[derive(Debug)]
enum PersistOp {
    Save { key: String, payload: String },
    Delete { key: String },
    Flush(oneshot::Sender<()>),
}

/// Applies snapshot writes in submission order on a background task.
///
/// Callers never wait for the store. When the queue is full the operation is
/// dropped and logged; the TTL cleans up whatever a dropped delete leaves.
#[derive(Clone)]
pub struct SnapshotWriter {
    tx: mpsc::Sender<PersistOp>,
}

impl SnapshotWriter {
    pub fn spawn(store: Arc<dyn SnapshotStore>, ttl_secs: u64, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<PersistOp>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(op) = rx.recv().await {
                match op {
                    PersistOp::Save { key, payload } => {
                        if let Err(error) = store.set(&key, &payload, ttl_secs).await {
                            warn!("[store] failed to save {key}: {error}");
                        }
                    }
                    PersistOp::Delete { key } => {
                        if let Err(error) = store.del(&key).await {
                            warn!("[store] failed to delete {key}: {error}");
                        }
                    }
                    PersistOp::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("[store] snapshot writer stopped");
        });
        Self { tx }
    }

    pub fn save(&self, key: String, payload: String) {
        self.enqueue(PersistOp::Save { key, payload });
    }

    pub fn delete(&self, key: String) {
        self.enqueue(PersistOp::Delete { key });
    }

    /// Resolves once every operation queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PersistOp::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    fn enqueue(&self, op: PersistOp) {
        if let Err(error) = self.tx.try_send(op) {
            warn!("[store] dropping snapshot operation: {error}");
        }
    }
}

fn expires_at_ms(ttl_secs: u64) -> u64 {
    now_ms().saturating_add(ttl_secs.saturating_mul(1_000))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

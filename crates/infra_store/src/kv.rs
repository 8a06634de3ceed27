//! Key-value store adapters
//!
//! Two implementations of the `KeyValueStore` port:
//!
//! - [`MemoryKeyValueStore`] keeps entries in a map and is used in tests and
//!   for ephemeral sessions.
//! - [`FileKeyValueStore`] keeps entries in a single JSON object on disk.
//!   Each write replaces the file through a temporary sibling and a rename,
//!   so a crash mid-write leaves the previous contents intact.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use core_kernel::{
    AdapterHealth, DomainPort, HealthCheckResult, HealthCheckable, KeyValueStore, PortError,
};

use crate::error::StoreError;

/// In-memory implementation of the KeyValueStore port
#[derive(Debug)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
    online: AtomicBool,
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            online: AtomicBool::new(true),
        }
    }

    /// Makes every call fail, as an unavailable storage backend would
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Offline)
        }
    }
}

impl DomainPort for MemoryKeyValueStore {}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PortError> {
        self.ensure_online()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PortError> {
        self.ensure_online()?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PortError> {
        self.ensure_online()?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for MemoryKeyValueStore {
    async fn health_check(&self) -> HealthCheckResult {
        let online = self.online.load(Ordering::SeqCst);
        HealthCheckResult {
            adapter_id: "memory-kv-store".to_string(),
            status: if online {
                AdapterHealth::Healthy
            } else {
                AdapterHealth::Unhealthy
            },
            latency_ms: 0,
            message: (!online).then(|| "store is offline".to_string()),
            checked_at: Utc::now(),
        }
    }
}

/// KeyValueStore backed by a JSON file
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    // Read-modify-write cycles on the file are serialised
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Opens the store, loading existing entries from `path` if present
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or does not
    /// hold a JSON object of strings.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no existing store file, starting empty");
                BTreeMap::new()
            }
            Err(err) => return Err(err.into()),
        };
        info!(keys = entries.len(), "opened file key-value store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl DomainPort for FileKeyValueStore {}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PortError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), PortError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(err) = self.flush(&entries).await {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            warn!(key, error = %err, "failed to write key-value file");
            return Err(err.into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), PortError> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };
        if let Err(err) = self.flush(&entries).await {
            entries.insert(key.to_string(), previous);
            warn!(key, error = %err, "failed to write key-value file");
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for FileKeyValueStore {
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let writable = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                tokio::fs::metadata(parent).await.map(|m| m.is_dir()).unwrap_or(false)
            }
            _ => true,
        };
        HealthCheckResult {
            adapter_id: "file-kv-store".to_string(),
            status: if writable {
                AdapterHealth::Healthy
            } else {
                AdapterHealth::Degraded
            },
            latency_ms: start.elapsed().as_millis() as u64,
            message: (!writable).then(|| format!("{} has no directory yet", self.path.display())),
            checked_at: Utc::now(),
        }
    }
}

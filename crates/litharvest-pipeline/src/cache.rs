use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

// ─── ResponseCache ────────────────────────────────────────────────────────────

/// Disk-backed cache for resolved PDF locations and API lookups. Entries
/// expire after the configured TTL; lookups are counted for the run report.
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheEntry<T> {
    stored_at: u64, // Unix timestamp secs
    value: T,
}

fn cache_key_to_path(dir: &Path, key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    dir.join(format!("{hash:016x}.json"))
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Cache key for a strategy's resolved location of one record.
pub fn response_key(strategy: &str, identity: &str) -> String {
    format!("{strategy}:{identity}")
}

pub fn default_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("litharvest")
        .join("cache")
}

impl ResponseCache {
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PipelineError::Cache(format!("{}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = cache_key_to_path(&self.dir, key);
        let Ok(data) = tokio::fs::read(&path).await else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let Ok(entry) = serde_json::from_slice::<CacheEntry<T>>(&data) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if unix_now().saturating_sub(entry.stored_at) > self.ttl.as_secs() {
            debug!(key, "cache entry expired");
            let _ = tokio::fs::remove_file(&path).await;
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        debug!(key, "cache hit");
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.value)
    }

    /// Best effort; a write failure costs a future cache miss, nothing more.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let path = cache_key_to_path(&self.dir, key);
        let entry = CacheEntry {
            stored_at: unix_now(),
            value,
        };
        if let Ok(data) = serde_json::to_vec(&entry) {
            let _ = tokio::fs::write(&path, data).await;
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

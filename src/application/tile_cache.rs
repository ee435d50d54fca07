// Versioned read-through cache for resolved tile data
use crate::domain::series::TileSeriesData;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub const CACHE_PREFIX: &str = "dashboard-studio:tile-data:";
pub const CACHE_VERSION: u32 = 1;

/// Durable key-value substrate behind the tile cache.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Process-local store, used when no cache directory is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub data: TileSeriesData,
}

/// Entries are never expired, only overwritten by the next successful fetch.
#[derive(Clone)]
pub struct TileCache {
    store: Arc<dyn KeyValueStore>,
}

impl TileCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn storage_key(request_key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, request_key)
    }

    pub fn read(&self, request_key: &str) -> Option<CacheRecord> {
        let raw = self.store.get(&Self::storage_key(request_key))?;
        match serde_json::from_str::<CacheRecord>(&raw) {
            Ok(record) if record.version == CACHE_VERSION => Some(record),
            Ok(record) => {
                tracing::debug!(
                    "Ignoring tile cache entry with version {} (want {})",
                    record.version,
                    CACHE_VERSION
                );
                None
            }
            Err(e) => {
                tracing::debug!("Unreadable tile cache entry: {}", e);
                None
            }
        }
    }

    /// Cache failures never fail a resolution; they are only logged.
    pub fn write(&self, request_key: &str, data: &TileSeriesData) {
        let record = CacheRecord {
            version: CACHE_VERSION,
            updated_at: Utc::now(),
            data: data.clone(),
        };
        let result = serde_json::to_string(&record)
            .map_err(anyhow::Error::from)
            .and_then(|raw| self.store.set(&Self::storage_key(request_key), &raw));
        if let Err(e) = result {
            tracing::warn!("Failed to write tile cache entry: {}", e);
        }
    }
}

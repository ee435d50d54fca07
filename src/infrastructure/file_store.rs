// Directory-backed key-value store for the tile data cache
use crate::application::tile_cache::KeyValueStore;
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One JSON file per key, named by the SHA-256 of the key.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("Failed to read cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write to a uniquely named temp file, fsync, then rename over the entry.
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        let mut file = tempfile::Builder::new()
            .prefix(".entry-")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .with_context(|| format!("Failed to create temp file in {}", self.dir.display()))?;
        file.write_all(value.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&path)
            .with_context(|| format!("Failed to replace cache entry {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tile_cache::TileCache;
    use crate::domain::series::TileSeriesData;
    use std::sync::Arc;

    #[test]
    fn test_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("tiles")).unwrap();

        assert_eq!(store.get("absent"), None);
        store.set("k", "{\"a\":1}").unwrap();
        store.set("k", "{\"a\":2}").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("{\"a\":2}"));
        assert_eq!(fs::read_dir(dir.path().join("tiles")).unwrap().count(), 1);
    }

    #[test]
    fn test_concurrent_writers_never_leave_partial_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let values: Vec<String> = (0..8).map(|i| format!("{{\"v\":\"{}\"}}", "x".repeat(4096 + i))).collect();

        let writers: Vec<_> = values
            .iter()
            .cloned()
            .map(|value| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        store.set("shared", &value).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let stored = store.get("shared").unwrap();
        assert!(values.contains(&stored));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let data = TileSeriesData {
            metrics: vec!["revenue".into()],
            primary_metric: Some("revenue".into()),
            ..Default::default()
        };

        let cache = TileCache::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        cache.write("key-1", &data);

        let reopened = TileCache::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        assert_eq!(reopened.read("key-1").unwrap().data, data);
    }
}

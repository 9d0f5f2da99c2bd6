use crate::cache::{CacheError, CacheKey, CacheStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Persistent cache storing one JSON document per key under a directory.
///
/// File names are derived from the key with filesystem-unsafe characters
/// replaced, so the full key is stored inside each document and checked on
/// read; a mismatch is reported as a miss.
#[derive(Clone)]
pub struct FileCache {
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct Entry {
    key: String,
    value: Value,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl CacheStore for FileCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError> {
        let key = key.to_string();
        let path = self.path_for(&key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: Entry = serde_json::from_str(&content)?;
        if entry.key != key {
            warn!(
                "Cache file {} holds key {}, expected {}",
                path.display(),
                entry.key,
                key
            );
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn set(&self, key: &CacheKey, value: Value) -> Result<(), CacheError> {
        let key = key.to_string();
        let path = self.path_for(&key);
        let json = serde_json::to_string(&Entry { key, value })?;

        // Write-then-rename so concurrent readers never see a partial document
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{}.tmp", std::process::id(), seq));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheKind;
    use crate::providers::ProviderKind;
    use serde_json::json;
    use tempfile::tempdir;

    fn key(model: &str) -> CacheKey {
        CacheKey::new(
            CacheKind::Embedding,
            ProviderKind::OpenAi,
            model,
            &json!({"input": "hello"}),
        )
    }

    #[tokio::test]
    async fn test_file_cache_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();

        assert!(cache.get(&key("m")).await.unwrap().is_none());
        cache.set(&key("m"), json!([[1.0, 2.0]])).await.unwrap();
        assert_eq!(cache.get(&key("m")).await.unwrap(), Some(json!([[1.0, 2.0]])));
    }

    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let cache = FileCache::new(dir.path()).unwrap();
            cache.set(&key("m"), json!("persisted")).await.unwrap();
        }
        let reopened = FileCache::new(dir.path()).unwrap();
        assert_eq!(
            reopened.get(&key("m")).await.unwrap(),
            Some(json!("persisted"))
        );
    }

    #[tokio::test]
    async fn test_file_cache_colliding_file_names_are_misses() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();

        // "models/x" and "models_x" sanitize to the same file name
        cache.set(&key("models/x"), json!("a")).await.unwrap();
        assert!(cache.get(&key("models_x")).await.unwrap().is_none());
        assert_eq!(cache.get(&key("models/x")).await.unwrap(), Some(json!("a")));
    }

    #[tokio::test]
    async fn test_file_cache_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        let cache = FileCache::new(nested.clone()).unwrap();
        cache.set(&key("m"), json!("v")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(&nested)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".json"));
    }
}

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::providers::ProviderKind;

pub mod file;
pub use file::FileCache;

pub mod memory;
pub use memory::MemoryCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Completion,
    Embedding,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Completion => "comp",
            CacheKind::Embedding => "emb",
        }
    }
}

/// Content address of one cached provider result.
///
/// Renders as `<type>:<provider>:<model>:<hex-digest>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub provider: ProviderKind,
    pub model: String,
    pub hash: String,
}

impl CacheKey {
    pub fn new(kind: CacheKind, provider: ProviderKind, model: &str, fields: &Value) -> Self {
        Self {
            kind,
            provider,
            model: model.to_string(),
            hash: hash_request(fields),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.kind.as_str(),
            self.provider,
            self.model,
            self.hash
        )
    }
}

/// Key-value store for provider results. Entries never expire.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &CacheKey, value: Value) -> Result<(), CacheError>;
}

/// SHA-256 of the canonical JSON form of `fields`, as lowercase hex.
pub fn hash_request(fields: &Value) -> String {
    let canonical = canonicalize(fields).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuilds `value` with every object's keys in sorted order, so serialization
/// does not depend on the order fields were inserted or received in.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

//! Cache storage partitioned into named generations.

use std::fmt;

use appshell_net::{Request, Response};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use http::Method;
use tokio::sync::RwLock;
use url::Url;

use crate::Result;

/// Request key of a cache entry: method + URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub url: String,
}

impl CacheKey {
    /// Key for an intercepted request.
    pub fn for_request(request: &Request) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.to_string(),
        }
    }

    /// Key for a GET of the given URL.
    pub fn get(url: &Url) -> Self {
        Self {
            method: Method::GET,
            url: url.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request key.
    pub key: CacheKey,

    /// Captured response.
    pub response: Response,

    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Capture a response for a request.
    pub fn new(key: CacheKey, response: Response) -> Self {
        Self {
            key,
            response,
            cached_at: Utc::now(),
        }
    }
}

/// Key-value storage of request/response pairs, partitioned into generations.
///
/// Single-key operations are atomic; concurrent writes to the same key are
/// last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Create the generation if it doesn't exist yet.
    async fn open(&self, generation: &str) -> Result<()>;

    /// Names of all existing generations, sorted.
    async fn generations(&self) -> Result<Vec<String>>;

    /// Delete a whole generation. Returns whether it existed.
    async fn delete_generation(&self, generation: &str) -> Result<bool>;

    /// Look up an entry.
    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store one entry, creating the generation if needed.
    async fn put(&self, generation: &str, entry: CacheEntry) -> Result<()>;

    /// Store a batch of entries; either all are written or none.
    async fn put_all(&self, generation: &str, entries: Vec<CacheEntry>) -> Result<()>;

    /// All keys stored in a generation.
    async fn keys(&self, generation: &str) -> Result<Vec<CacheKey>>;
}

/// One generation's entries.
#[derive(Debug, Default)]
struct Generation {
    entries: HashMap<CacheKey, CacheEntry>,
}

/// In-memory cache store.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    generations: RwLock<HashMap<String, Generation>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn open(&self, generation: &str) -> Result<()> {
        self.generations
            .write()
            .await
            .entry(generation.to_string())
            .or_default();
        Ok(())
    }

    async fn generations(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.generations.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool> {
        Ok(self.generations.write().await.remove(generation).is_some())
    }

    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self
            .generations
            .read()
            .await
            .get(generation)
            .and_then(|g| g.entries.get(key))
            .cloned())
    }

    async fn put(&self, generation: &str, entry: CacheEntry) -> Result<()> {
        self.generations
            .write()
            .await
            .entry(generation.to_string())
            .or_default()
            .entries
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn put_all(&self, generation: &str, entries: Vec<CacheEntry>) -> Result<()> {
        // A single write lock makes the batch visible all at once.
        let mut generations = self.generations.write().await;
        let target = generations.entry(generation.to_string()).or_default();
        for entry in entries {
            target.entries.insert(entry.key.clone(), entry);
        }
        Ok(())
    }

    async fn keys(&self, generation: &str) -> Result<Vec<CacheKey>> {
        let generations = self.generations.read().await;
        let mut keys: Vec<CacheKey> = generations
            .get(generation)
            .map(|g| g.entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(keys)
    }
}

//! Cache generations.
//!
//! Exactly one generation is authoritative: the one named by the worker
//! configuration. Reads and writes go to it; every other generation is
//! deleted on activation.

use std::sync::Arc;

use appshell_common::WorkerConfig;
use appshell_net::{Request, Response};
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::classify::ensure_cacheable;
use crate::Result;

/// Outcome of stale generation cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// The generation that remains authoritative.
    pub current: String,
    /// Stale generations that were deleted.
    pub deleted: Vec<String>,
    /// Stale generations whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
}

/// Owns the current generation and the policy for reaching it.
pub struct GenerationManager {
    config: Arc<WorkerConfig>,
    store: Arc<dyn CacheStore>,
}

impl GenerationManager {
    pub fn new(config: Arc<WorkerConfig>, store: Arc<dyn CacheStore>) -> Self {
        Self { config, store }
    }

    /// The current generation identifier.
    pub fn current(&self) -> &str {
        &self.config.generation
    }

    /// Create (or reuse) the current generation.
    pub async fn install(&self) -> Result<()> {
        self.store.open(self.current()).await?;
        debug!(generation = %self.current(), "Generation opened");
        Ok(())
    }

    /// Delete every generation other than the current one.
    ///
    /// A failed deletion is logged and recorded; it never aborts the others.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let mut report = ActivationReport {
            current: self.current().to_string(),
            ..Default::default()
        };

        for name in self.store.generations().await? {
            if name == self.current() {
                continue;
            }
            match self.store.delete_generation(&name).await {
                Ok(_) => {
                    info!(generation = %name, "Deleted stale generation");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(generation = %name, error = %e, "Failed to delete stale generation");
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Look up a request in the current generation.
    pub async fn lookup(&self, request: &Request) -> Result<Option<Response>> {
        let key = CacheKey::for_request(request);
        let entry = self.store.get(self.current(), &key).await?;
        Ok(entry.map(|e| e.response))
    }

    /// Store a response for a request in the current generation.
    pub async fn store_response(&self, request: &Request, response: Response) -> Result<()> {
        ensure_cacheable(&self.config, request)?;
        let entry = CacheEntry::new(CacheKey::for_request(request), response);
        self.store.put(self.current(), entry).await
    }

    /// Store a batch in the current generation; nothing is written if any
    /// request in the batch is uncacheable.
    pub async fn store_batch(&self, batch: Vec<(Request, Response)>) -> Result<()> {
        let mut entries = Vec::with_capacity(batch.len());
        for (request, response) in batch {
            ensure_cacheable(&self.config, &request)?;
            entries.push(CacheEntry::new(CacheKey::for_request(&request), response));
        }
        self.store.put_all(self.current(), entries).await
    }
}

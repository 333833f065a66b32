//! App shell preloading.

use std::sync::Arc;

use appshell_common::WorkerConfig;
use appshell_net::{Fetcher, Request, Response};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::generation::GenerationManager;
use crate::{Result, ServiceWorkerError};

/// Populates the current generation with the app shell manifest.
pub struct ShellPreloader {
    config: Arc<WorkerConfig>,
    fetcher: Arc<dyn Fetcher>,
    generations: Arc<GenerationManager>,
}

impl ShellPreloader {
    pub fn new(
        config: Arc<WorkerConfig>,
        fetcher: Arc<dyn Fetcher>,
        generations: Arc<GenerationManager>,
    ) -> Self {
        Self {
            config,
            fetcher,
            generations,
        }
    }

    /// Fetch every manifest resource and commit them as one batch.
    ///
    /// Any transport failure or non-ok status fails the whole preload and
    /// nothing is written. Returns the number of entries stored.
    pub async fn preload(&self) -> Result<usize> {
        let urls = self.config.manifest_urls()?;
        debug!(
            count = urls.len(),
            generation = %self.generations.current(),
            "Preloading app shell"
        );

        let fetches = urls.into_iter().map(|url| self.fetch_one(Request::get(url)));
        let batch = try_join_all(fetches).await?;
        let count = batch.len();

        self.generations.store_batch(batch).await?;

        info!(count, generation = %self.generations.current(), "App shell cached");
        Ok(count)
    }

    async fn fetch_one(&self, request: Request) -> Result<(Request, Response)> {
        let response = self.fetcher.fetch(&request).await.map_err(|e| {
            warn!(url = %request.url, error = %e, "Shell resource unreachable");
            ServiceWorkerError::InstallFailed(format!("{}: {}", request.url, e))
        })?;

        if !response.ok() {
            warn!(url = %request.url, status = %response.status, "Shell resource not ok");
            return Err(ServiceWorkerError::InstallFailed(format!(
                "{} returned {}",
                request.url, response.status
            )));
        }

        Ok((request, response))
    }
}

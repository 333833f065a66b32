//! Caching strategies.
//!
//! Each intercepted request enters exactly one strategy and ends on the first
//! response handed back to the client:
//!
//! | Category     | Strategy                                   |
//! |--------------|--------------------------------------------|
//! | ignored      | pass through                               |
//! | api          | network only                               |
//! | navigation   | network → cache for this URL → offline page |
//! | static asset | stale-while-revalidate                     |

use std::sync::Arc;

use appshell_common::WorkerConfig;
use appshell_net::{Fetcher, Request, Response};
use http::{header, HeaderValue, StatusCode};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::background::BackgroundTasks;
use crate::classify::{classify, RequestCategory};
use crate::generation::GenerationManager;
use crate::{Result, ServiceWorkerError};

const OFFLINE_HTML: &str = "<!DOCTYPE html><html><head><title>Offline</title></head>\
<body><h1>You are offline</h1><p>Check your connection and try again.</p></body></html>";

/// Where a substituted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network.
    Network,
    /// Cached entry for the requested URL.
    Cache,
    /// The cached offline fallback page.
    OfflineFallback,
    /// Built in place because nothing else was available.
    Synthesized,
}

/// A response substituted by the interceptor.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub response: Response,
    pub source: ResponseSource,
}

impl FetchResponse {
    fn new(response: Response, source: ResponseSource) -> Self {
        Self { response, source }
    }

    /// Whether the response was served from the cache.
    pub fn from_cache(&self) -> bool {
        matches!(
            self.source,
            ResponseSource::Cache | ResponseSource::OfflineFallback
        )
    }
}

/// Result of fetch interception.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The interceptor declined; platform default networking applies.
    PassThrough,
    /// The interceptor produced the response.
    Respond(FetchResponse),
}

impl FetchOutcome {
    /// The substituted response, if any.
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            FetchOutcome::PassThrough => None,
            FetchOutcome::Respond(r) => Some(r),
        }
    }
}

/// Executes the caching strategy for each classified request.
pub struct StrategyEngine {
    config: Arc<WorkerConfig>,
    fetcher: Arc<dyn Fetcher>,
    generations: Arc<GenerationManager>,
    background: BackgroundTasks,
}

impl StrategyEngine {
    pub fn new(
        config: Arc<WorkerConfig>,
        fetcher: Arc<dyn Fetcher>,
        generations: Arc<GenerationManager>,
        background: BackgroundTasks,
    ) -> Self {
        Self {
            config,
            fetcher,
            generations,
            background,
        }
    }

    /// Classify a request and run its strategy.
    pub async fn handle(&self, request: Request) -> Result<FetchOutcome> {
        let category = classify(&self.config, &request);
        debug!(
            url = %request.url,
            method = %request.method,
            category = category.as_str(),
            "Intercepted request"
        );

        let response = match category {
            RequestCategory::Ignored => return Ok(FetchOutcome::PassThrough),
            RequestCategory::Api => self.network_only(&request).await?,
            RequestCategory::Navigation => self.network_first(request).await?,
            RequestCategory::StaticAsset => self.stale_while_revalidate(request).await?,
        };
        Ok(FetchOutcome::Respond(response))
    }

    /// Network only; no cache reads or writes.
    async fn network_only(&self, request: &Request) -> Result<FetchResponse> {
        let response = self.fetcher.fetch(request).await?;
        Ok(FetchResponse::new(response, ResponseSource::Network))
    }

    /// Network first, falling back to the cached page, then the offline page.
    async fn network_first(&self, request: Request) -> Result<FetchResponse> {
        match self.fetcher.fetch(&request).await {
            Ok(response) => {
                if response.ok() {
                    self.store_in_background("navigation-store", request, response.clone());
                }
                Ok(FetchResponse::new(response, ResponseSource::Network))
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Navigation offline, trying cache");
                if let Some(cached) = self.lookup(&request).await {
                    return Ok(FetchResponse::new(cached, ResponseSource::Cache));
                }
                self.offline_page().await
            }
        }
    }

    /// Serve from cache when present while refreshing from the network.
    async fn stale_while_revalidate(&self, request: Request) -> Result<FetchResponse> {
        let (tx, rx) = oneshot::channel();
        let (looked_up_tx, looked_up_rx) = oneshot::channel::<()>();

        let fetcher = self.fetcher.clone();
        let generations = self.generations.clone();
        let network_request = request.clone();
        self.background.spawn("revalidate", async move {
            let result = fetcher.fetch(&network_request).await;
            let fresh = match &result {
                Ok(response) if response.ok() => Some(response.clone()),
                _ => None,
            };
            // The client may already have been served from cache.
            let _ = tx.send(result);
            match fresh {
                Some(response) => {
                    // The refresh must not overwrite the entry before the
                    // client's own lookup has read it.
                    let _ = looked_up_rx.await;
                    generations.store_response(&network_request, response).await
                }
                None => Ok(()),
            }
        });

        let cached = self.lookup(&request).await;
        let _ = looked_up_tx.send(());
        if let Some(cached) = cached {
            return Ok(FetchResponse::new(cached, ResponseSource::Cache));
        }

        match rx.await {
            Ok(Ok(response)) => Ok(FetchResponse::new(response, ResponseSource::Network)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ServiceWorkerError::NetworkError(format!(
                "revalidation of {} was abandoned",
                request.url
            ))),
        }
    }

    /// Cache lookup in the current generation; store errors count as misses.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.generations.lookup(request).await {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed");
                None
            }
        }
    }

    async fn offline_page(&self) -> Result<FetchResponse> {
        let offline_url = self.config.offline_url()?;
        if let Some(page) = self.lookup(&Request::get(offline_url.clone())).await {
            return Ok(FetchResponse::new(page, ResponseSource::OfflineFallback));
        }

        warn!(url = %offline_url, "Offline page missing from cache");
        let page = Response::new(offline_url, StatusCode::SERVICE_UNAVAILABLE, OFFLINE_HTML)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
        Ok(FetchResponse::new(page, ResponseSource::Synthesized))
    }

    fn store_in_background(&self, label: &'static str, request: Request, response: Response) {
        let generations = self.generations.clone();
        self.background.spawn(label, async move {
            generations.store_response(&request, response).await
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, CacheStore, MemoryCacheStore};
    use appshell_net::NetError;
    use async_trait::async_trait;
    use hashbrown::HashMap;
    use std::sync::Mutex;
    use url::Url;

    /// Origin that serves a fixed table and fails everything else.
    #[derive(Default)]
    struct TableOrigin {
        pages: Mutex<HashMap<String, (StatusCode, &'static str)>>,
        hits: Mutex<Vec<String>>,
    }

    impl TableOrigin {
        fn serve(&self, path: &str, status: StatusCode, body: &'static str) {
            self.pages
                .lock()
                .unwrap()
                .insert(path.to_string(), (status, body));
        }

        fn go_offline(&self) {
            self.pages.lock().unwrap().clear();
        }

        fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetcher for TableOrigin {
        async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetError> {
            self.hits.lock().unwrap().push(request.url.path().to_string());
            let page = self.pages.lock().unwrap().get(request.url.path()).copied();
            match page {
                Some((status, body)) => Ok(Response::new(request.url.clone(), status, body)),
                None => Err(NetError::RequestFailed("offline".into())),
            }
        }
    }

    struct Harness {
        origin: Arc<TableOrigin>,
        store: Arc<MemoryCacheStore>,
        engine: StrategyEngine,
    }

    fn harness() -> Harness {
        let config = Arc::new(
            WorkerConfig::default().with_origin(Url::parse("https://app.example.com").unwrap()),
        );
        let origin = Arc::new(TableOrigin::default());
        let store = Arc::new(MemoryCacheStore::new());
        let generations = Arc::new(GenerationManager::new(config.clone(), store.clone()));
        let engine = StrategyEngine::new(
            config,
            origin.clone(),
            generations,
            BackgroundTasks::new(),
        );
        Harness {
            origin,
            store,
            engine,
        }
    }

    fn url(path: &str) -> Url {
        Url::parse("https://app.example.com").unwrap().join(path).unwrap()
    }

    async fn seed(store: &MemoryCacheStore, path: &str, body: &'static str) {
        let url = url(path);
        store
            .put(
                "appshell-v1",
                crate::cache::CacheEntry::new(
                    CacheKey::get(&url),
                    Response::new(url, StatusCode::OK, body),
                ),
            )
            .await
            .unwrap();
    }

    fn body(outcome: &FetchOutcome) -> &[u8] {
        &outcome.response().unwrap().response.body
    }

    #[tokio::test]
    async fn test_cross_origin_passes_through() {
        let h = harness();
        let outcome = h
            .engine
            .handle(Request::get(Url::parse("https://cdn.example.net/x.js").unwrap()))
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::PassThrough));
        assert!(h.origin.hits().is_empty());
    }

    #[tokio::test]
    async fn test_api_is_network_only() {
        let h = harness();
        h.origin.serve("/api/leads", StatusCode::OK, "[]");
        seed(&h.store, "/api/leads", "stale").await;

        let outcome = h.engine.handle(Request::get(url("/api/leads"))).await.unwrap();
        h.engine.background.settle().await;
        assert_eq!(body(&outcome), b"[]");
        assert_eq!(outcome.response().unwrap().source, ResponseSource::Network);

        h.origin.go_offline();
        let offline = h.engine.handle(Request::get(url("/api/leads"))).await;
        assert!(matches!(offline, Err(ServiceWorkerError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_navigation_online_stores_copy() {
        let h = harness();
        h.origin.serve("/dashboard", StatusCode::OK, "<h1>dash</h1>");

        let outcome = h.engine.handle(Request::navigate(url("/dashboard"))).await.unwrap();
        assert_eq!(body(&outcome), b"<h1>dash</h1>");

        h.engine.background.settle().await;
        let key = CacheKey::get(&url("/dashboard"));
        assert!(h.store.get("appshell-v1", &key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_navigation_error_status_not_stored() {
        let h = harness();
        h.origin.serve("/broken", StatusCode::INTERNAL_SERVER_ERROR, "oops");

        let outcome = h.engine.handle(Request::navigate(url("/broken"))).await.unwrap();
        h.engine.background.settle().await;

        assert_eq!(outcome.response().unwrap().response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(h.store.keys("appshell-v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_navigation_offline_uses_cached_page() {
        let h = harness();
        seed(&h.store, "/dashboard", "cached dash").await;
        seed(&h.store, "/offline.html", "offline").await;

        let outcome = h.engine.handle(Request::navigate(url("/dashboard"))).await.unwrap();

        assert_eq!(body(&outcome), b"cached dash");
        assert_eq!(outcome.response().unwrap().source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_navigation_offline_falls_back_to_offline_page() {
        let h = harness();
        seed(&h.store, "/offline.html", "offline").await;

        let outcome = h.engine.handle(Request::navigate(url("/reports"))).await.unwrap();

        assert_eq!(body(&outcome), b"offline");
        assert_eq!(outcome.response().unwrap().source, ResponseSource::OfflineFallback);
        assert!(outcome.response().unwrap().from_cache());
    }

    #[tokio::test]
    async fn test_navigation_offline_without_shell_synthesizes_page() {
        let h = harness();

        let outcome = h.engine.handle(Request::navigate(url("/reports"))).await.unwrap();
        let response = outcome.response().unwrap();

        assert_eq!(response.source, ResponseSource::Synthesized);
        assert_eq!(response.response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.response.content_type(), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_static_asset_stale_then_fresh() {
        let h = harness();
        seed(&h.store, "/css/styles.css", "old").await;
        h.origin.serve("/css/styles.css", StatusCode::OK, "new");

        let first = h.engine.handle(Request::get(url("/css/styles.css"))).await.unwrap();
        assert_eq!(body(&first), b"old");
        assert_eq!(first.response().unwrap().source, ResponseSource::Cache);

        h.engine.background.settle().await;

        let second = h.engine.handle(Request::get(url("/css/styles.css"))).await.unwrap();
        assert_eq!(body(&second), b"new");
    }

    #[tokio::test]
    async fn test_static_asset_miss_uses_network_and_stores() {
        let h = harness();
        h.origin.serve("/js/app.js", StatusCode::OK, "console.log(1)");

        let outcome = h.engine.handle(Request::get(url("/js/app.js"))).await.unwrap();
        assert_eq!(outcome.response().unwrap().source, ResponseSource::Network);

        h.engine.background.settle().await;
        let key = CacheKey::get(&url("/js/app.js"));
        assert!(h.store.get("appshell-v1", &key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_static_asset_miss_and_offline_fails() {
        let h = harness();
        let result = h.engine.handle(Request::get(url("/icons/missing.png"))).await;
        assert!(matches!(result, Err(ServiceWorkerError::NetworkError(_))));
    }

    #[tokio::test]
    async fn test_static_asset_hit_survives_network_failure() {
        let h = harness();
        seed(&h.store, "/js/app.js", "cached").await;

        let outcome = h.engine.handle(Request::get(url("/js/app.js"))).await.unwrap();
        h.engine.background.settle().await;

        assert_eq!(body(&outcome), b"cached");
        let key = CacheKey::get(&url("/js/app.js"));
        let entry = h.store.get("appshell-v1", &key).await.unwrap().unwrap();
        assert_eq!(&entry.response.body[..], b"cached");
    }
}

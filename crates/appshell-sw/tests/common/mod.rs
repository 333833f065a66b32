//! Shared test doubles for the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use appshell_common::WorkerConfig;
use appshell_net::{Fetcher, NetError, Request, Response};
use appshell_sw::{
    CacheEntry, CacheKey, CacheStore, MemoryCacheStore, MemoryClients,
    MemoryNotificationCenter, Result, ServiceWorker,
};
use async_trait::async_trait;
use hashbrown::HashMap;
use http::StatusCode;
use url::Url;

pub const ORIGIN: &str = "https://app.example.com";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn config(generation: &str) -> WorkerConfig {
    WorkerConfig::default()
        .with_origin(Url::parse(ORIGIN).unwrap())
        .with_generation(generation)
}

/// An origin whose responses can be rewritten and which can go offline.
#[derive(Default)]
pub struct ScriptedOrigin {
    bodies: Mutex<HashMap<String, (StatusCode, String)>>,
    offline: AtomicBool,
    stalled: AtomicBool,
    hits: AtomicUsize,
}

impl ScriptedOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `body` with status 200 for `path`.
    pub fn serve(&self, path: &str, body: &str) {
        self.serve_status(path, StatusCode::OK, body);
    }

    pub fn serve_status(&self, path: &str, status: StatusCode, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Requests hang forever while stalled.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedOrigin {
    async fn fetch(&self, request: &Request) -> std::result::Result<Response, NetError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::RequestFailed("offline".into()));
        }
        let path = request.url.path().to_string();
        let scripted = self.bodies.lock().unwrap().get(&path).cloned();
        let (status, body) =
            scripted.unwrap_or_else(|| (StatusCode::OK, format!("body of {}", path)));
        Ok(Response::new(request.url.clone(), status, body))
    }
}

/// A cache store that records every key it is asked to read or write.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryCacheStore,
    reads: Mutex<Vec<CacheKey>>,
    writes: Mutex<Vec<CacheKey>>,
    stall_puts: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reads(&self) -> Vec<CacheKey> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<CacheKey> {
        self.writes.lock().unwrap().clone()
    }

    /// Single-entry writes hang forever once set. Batches are unaffected.
    pub fn stall_puts(&self) {
        self.stall_puts.store(true, Ordering::SeqCst);
    }

    pub fn touched(&self, url: &Url) -> bool {
        let hit = |k: &CacheKey| k.url == url.as_str();
        self.reads().iter().any(hit) || self.writes().iter().any(hit)
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn open(&self, generation: &str) -> Result<()> {
        self.inner.open(generation).await
    }

    async fn generations(&self) -> Result<Vec<String>> {
        self.inner.generations().await
    }

    async fn delete_generation(&self, generation: &str) -> Result<bool> {
        self.inner.delete_generation(generation).await
    }

    async fn get(&self, generation: &str, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.reads.lock().unwrap().push(key.clone());
        self.inner.get(generation, key).await
    }

    async fn put(&self, generation: &str, entry: CacheEntry) -> Result<()> {
        self.writes.lock().unwrap().push(entry.key.clone());
        if self.stall_puts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.put(generation, entry).await
    }

    async fn put_all(&self, generation: &str, entries: Vec<CacheEntry>) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .extend(entries.iter().map(|e| e.key.clone()));
        self.inner.put_all(generation, entries).await
    }

    async fn keys(&self, generation: &str) -> Result<Vec<CacheKey>> {
        self.inner.keys(generation).await
    }
}

/// A worker wired to in-memory doubles.
pub struct Harness {
    pub worker: ServiceWorker,
    pub origin: Arc<ScriptedOrigin>,
    pub store: Arc<RecordingStore>,
    pub clients: Arc<MemoryClients>,
    pub center: Arc<MemoryNotificationCenter>,
}

impl Harness {
    pub fn new(generation: &str) -> Self {
        Self::with_store(generation, RecordingStore::new())
    }

    pub fn with_store(generation: &str, store: Arc<RecordingStore>) -> Self {
        Self::build(config(generation), ScriptedOrigin::new(), store)
    }

    pub fn build(
        config: WorkerConfig,
        origin: Arc<ScriptedOrigin>,
        store: Arc<RecordingStore>,
    ) -> Self {
        let clients = Arc::new(MemoryClients::new(config.origin.clone()));
        let center = Arc::new(MemoryNotificationCenter::new());
        let worker = ServiceWorker::builder(config)
            .fetcher(origin.clone())
            .store(store.clone())
            .clients(clients.clone())
            .notifications(center.clone())
            .build()
            .unwrap();
        Self {
            worker,
            origin,
            store,
            clients,
            center,
        }
    }

    /// Install and activate.
    pub async fn activated(generation: &str) -> Self {
        let harness = Self::new(generation);
        harness.worker.install().await.unwrap();
        harness.worker.activate().await.unwrap();
        harness
    }
}

/// Route worker logs through the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("appshell_sw=debug")
        .with_test_writer()
        .try_init();
}

//! # AppShell Service Worker
//!
//! Offline-capable request interception between a web client and its origin.
//!
//! ## Features
//!
//! - **Generations**: cached content is bounded to one generation at a time
//! - **Shell preloading**: all-or-nothing install of the app shell manifest
//! - **Classification**: ignored, API, navigation, static asset
//! - **Strategies**: network-only, network-first with offline fallback,
//!   stale-while-revalidate
//! - **Notifications**: push display and click routing to client windows
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker::handle(WorkerEvent)
//!     │
//!     ├── Install ──────────── GenerationManager::install + ShellPreloader
//!     ├── Activate / SKIP_WAITING ── GenerationManager::activate + claim
//!     ├── Fetch ────────────── classify → StrategyEngine
//!     │                             └── BackgroundTasks (detached writes)
//!     ├── Push ─────────────── NotificationDispatcher::on_push
//!     └── NotificationClick ── NotificationDispatcher::on_click
//!
//! CacheStore
//!     └── generation name → (CacheKey → CacheEntry)
//! ```

use appshell_common::ShellError;
use appshell_net::NetError;
use thiserror::Error;

pub mod background;
pub mod cache;
pub mod classify;
pub mod clients;
pub mod generation;
pub mod notify;
pub mod preload;
pub mod strategy;
pub mod worker;

pub use background::BackgroundTasks;
pub use cache::{CacheEntry, CacheKey, CacheStore, MemoryCacheStore};
pub use classify::{classify, ensure_cacheable, RequestCategory};
pub use clients::{Client, ClientMatchOptions, MemoryClients, WindowClients};
pub use generation::{ActivationReport, GenerationManager};
pub use notify::{
    ClickOutcome, MemoryNotificationCenter, Notification, NotificationCenter, NotificationClick,
    NotificationData, NotificationDispatcher, PushPayload,
};
pub use preload::ShellPreloader;
pub use strategy::{FetchOutcome, FetchResponse, ResponseSource, StrategyEngine};
pub use worker::{
    ControlMessage, EventOutcome, ServiceWorker, ServiceWorkerBuilder, WorkerEvent, WorkerState,
};

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone)]
pub enum ServiceWorkerError {
    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Refusing to cache {url}: {reason}")]
    Uncacheable { url: String, reason: &'static str },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Client error: {0}")]
    ClientError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl ServiceWorkerError {
    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            ServiceWorkerError::InstallFailed(_) => "install",
            ServiceWorkerError::CacheError(_) => "cache",
            ServiceWorkerError::Uncacheable { .. } => "uncacheable",
            ServiceWorkerError::NetworkError(_) => "network",
            ServiceWorkerError::ClientError(_) => "client",
            ServiceWorkerError::StateError(_) => "state",
            ServiceWorkerError::ConfigError(_) => "config",
        }
    }
}

impl From<NetError> for ServiceWorkerError {
    fn from(e: NetError) -> Self {
        ServiceWorkerError::NetworkError(e.to_string())
    }
}

impl From<ShellError> for ServiceWorkerError {
    fn from(e: ShellError) -> Self {
        ServiceWorkerError::ConfigError(e.to_string())
    }
}

/// Result type alias for service worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;

//! The worker: lifecycle state and event dispatch.
//!
//! Every platform event arrives as a [`WorkerEvent`] and is routed to the
//! component that owns it. The returned future settles only when the work the
//! event must keep alive (install batch, cleanup, notification display) is
//! done; detached cache writes are tracked separately and awaited with
//! [`ServiceWorker::settle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use appshell_common::WorkerConfig;
use appshell_net::{Fetcher, HttpFetcher, LoaderConfig, Request};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::background::BackgroundTasks;
use crate::cache::{CacheStore, MemoryCacheStore};
use crate::clients::{MemoryClients, WindowClients};
use crate::generation::{ActivationReport, GenerationManager};
use crate::notify::{
    ClickOutcome, MemoryNotificationCenter, Notification, NotificationCenter, NotificationClick,
    NotificationDispatcher,
};
use crate::preload::ShellPreloader;
use crate::strategy::{FetchOutcome, StrategyEngine};
use crate::{Result, ServiceWorkerError};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
    /// Constructed, not installed yet.
    #[default]
    Parsed,
    /// Install in progress.
    Installing,
    /// Installed and waiting for activation.
    Installed,
    /// Stale generation cleanup in progress.
    Activating,
    /// Active and intercepting requests.
    Activated,
    /// Install failed; a later install may retry.
    Redundant,
}

/// Control message posted by a controlled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate now instead of waiting for older workers to go away.
    SkipWaiting,
}

/// Events delivered to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Message(JsonValue),
    Fetch(Request),
    Push(Option<Bytes>),
    NotificationClick(NotificationClick),
}

impl WorkerEvent {
    fn name(&self) -> &'static str {
        match self {
            WorkerEvent::Install => "install",
            WorkerEvent::Activate => "activate",
            WorkerEvent::Message(_) => "message",
            WorkerEvent::Fetch(_) => "fetch",
            WorkerEvent::Push(_) => "push",
            WorkerEvent::NotificationClick(_) => "notificationclick",
        }
    }
}

/// What handling an event produced.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// Shell cached; number of entries.
    Installed(usize),
    /// Stale generations cleaned up and clients claimed.
    Activated(ActivationReport),
    /// A control message was applied. Carries the activation it triggered.
    MessageHandled(Option<ActivationReport>),
    /// The message was not a recognized control message.
    MessageIgnored,
    Fetch(FetchOutcome),
    NotificationShown(Notification),
    ClickRouted(ClickOutcome),
}

/// An offline interception worker for one generation of the app shell.
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    state: RwLock<WorkerState>,
    // Serializes lifecycle transitions (install, activate, skip-waiting).
    lifecycle: Mutex<()>,
    skip_waiting: AtomicBool,
    generations: Arc<GenerationManager>,
    preloader: ShellPreloader,
    engine: StrategyEngine,
    notifications: NotificationDispatcher,
    clients: Arc<dyn WindowClients>,
    background: BackgroundTasks,
}

impl ServiceWorker {
    /// Start building a worker.
    pub fn builder(config: WorkerConfig) -> ServiceWorkerBuilder {
        ServiceWorkerBuilder::new(config)
    }

    /// The immutable configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// The generation manager (current generation access).
    pub fn generations(&self) -> &GenerationManager {
        &self.generations
    }

    /// Route an event to its handler.
    pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome> {
        let name = event.name();
        let started = Instant::now();

        let outcome = match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Message(message) => self.on_message(message).await,
            WorkerEvent::Fetch(request) => self.fetch(request).await.map(EventOutcome::Fetch),
            WorkerEvent::Push(payload) => self
                .notifications
                .on_push(payload.as_deref())
                .await
                .map(EventOutcome::NotificationShown),
            WorkerEvent::NotificationClick(click) => self
                .notifications
                .on_click(click)
                .await
                .map(EventOutcome::ClickRouted),
        };

        match &outcome {
            Ok(_) => debug!(event = name, elapsed = ?started.elapsed(), "Event handled"),
            Err(e) => warn!(event = name, category = e.category(), error = %e, "Event failed"),
        }
        outcome
    }

    /// Open the current generation and cache the app shell.
    ///
    /// On failure the worker becomes redundant and nothing is committed.
    pub async fn install(&self) -> Result<usize> {
        let _guard = self.lifecycle.lock().await;
        match self.state().await {
            WorkerState::Parsed | WorkerState::Installed | WorkerState::Redundant => {}
            other => {
                return Err(ServiceWorkerError::StateError(format!(
                    "cannot install while {:?}",
                    other
                )))
            }
        }
        self.set_state(WorkerState::Installing).await;

        let count = match self.install_shell().await {
            Ok(count) => count,
            Err(e) => {
                self.set_state(WorkerState::Redundant).await;
                error!(generation = %self.config.generation, error = %e, "Install failed");
                return Err(e);
            }
        };
        self.set_state(WorkerState::Installed).await;
        info!(generation = %self.config.generation, count, "Worker installed");

        // Pending skip-waiting activates under the install lock.
        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate_locked().await?;
        }
        Ok(count)
    }

    /// Delete stale generations, then take control of open pages.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let _guard = self.lifecycle.lock().await;
        self.activate_locked().await
    }

    /// Activation body. Callers hold the lifecycle lock.
    async fn activate_locked(&self) -> Result<ActivationReport> {
        let state = self.state().await;
        if state != WorkerState::Installed {
            return Err(ServiceWorkerError::StateError(format!(
                "cannot activate while {:?}",
                state
            )));
        }
        self.set_state(WorkerState::Activating).await;

        let report = match self.generations.activate().await {
            Ok(report) => report,
            Err(e) => {
                // Nothing was deleted; the current generation is intact.
                warn!(error = %e, "Could not enumerate generations");
                ActivationReport {
                    current: self.config.generation.clone(),
                    ..Default::default()
                }
            }
        };

        let claimed = match self.clients.claim().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Claiming clients failed");
                0
            }
        };

        self.set_state(WorkerState::Activated).await;
        info!(
            generation = %report.current,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            claimed,
            "Worker activated"
        );
        Ok(report)
    }

    /// Activate as soon as possible, preempting the staged rollover.
    ///
    /// Activates immediately when installed; when install is still pending,
    /// activation follows it. Returns the activation it triggered, if any.
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>> {
        self.skip_waiting.store(true, Ordering::SeqCst);
        let _guard = self.lifecycle.lock().await;
        match self.state().await {
            WorkerState::Installed => self.activate_locked().await.map(Some),
            state => {
                debug!(?state, "skip-waiting recorded");
                Ok(None)
            }
        }
    }

    /// Intercept a request. Only an activated worker substitutes responses.
    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
        if self.state().await != WorkerState::Activated {
            return Ok(FetchOutcome::PassThrough);
        }
        self.engine.handle(request).await
    }

    /// Wait for detached cache writes to finish.
    pub async fn settle(&self) {
        self.background.settle().await;
    }

    async fn install_shell(&self) -> Result<usize> {
        self.generations.install().await?;
        self.preloader.preload().await
    }

    async fn on_message(&self, message: JsonValue) -> Result<EventOutcome> {
        match serde_json::from_value::<ControlMessage>(message) {
            Ok(ControlMessage::SkipWaiting) => {
                self.skip_waiting().await.map(EventOutcome::MessageHandled)
            }
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized message");
                Ok(EventOutcome::MessageIgnored)
            }
        }
    }

    async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
        debug!(?state, "Worker state changed");
    }
}

/// Builder for [`ServiceWorker`].
pub struct ServiceWorkerBuilder {
    config: WorkerConfig,
    fetcher: Option<Arc<dyn Fetcher>>,
    store: Option<Arc<dyn CacheStore>>,
    clients: Option<Arc<dyn WindowClients>>,
    notifications: Option<Arc<dyn NotificationCenter>>,
}

impl ServiceWorkerBuilder {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            fetcher: None,
            store: None,
            clients: None,
            notifications: None,
        }
    }

    /// Network used for every fetch. Defaults to an [`HttpFetcher`].
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Cache storage. Defaults to a fresh [`MemoryCacheStore`].
    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Open windows. Defaults to an empty [`MemoryClients`].
    pub fn clients(mut self, clients: Arc<dyn WindowClients>) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Notification center. Defaults to a [`MemoryNotificationCenter`].
    pub fn notifications(mut self, center: Arc<dyn NotificationCenter>) -> Self {
        self.notifications = Some(center);
        self
    }

    /// Validate the configuration and wire the components.
    pub fn build(self) -> Result<ServiceWorker> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(f) => f,
            None => Arc::new(HttpFetcher::new(LoaderConfig::default())?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCacheStore::new()));
        let clients = self
            .clients
            .unwrap_or_else(|| Arc::new(MemoryClients::new(config.origin.clone())));
        let center = self
            .notifications
            .unwrap_or_else(|| Arc::new(MemoryNotificationCenter::new()));

        let background = BackgroundTasks::new();
        let generations = Arc::new(GenerationManager::new(config.clone(), store));
        let preloader = ShellPreloader::new(config.clone(), fetcher.clone(), generations.clone());
        let engine = StrategyEngine::new(
            config.clone(),
            fetcher,
            generations.clone(),
            background.clone(),
        );
        let notifications = NotificationDispatcher::new(config.clone(), center, clients.clone());

        Ok(ServiceWorker {
            config,
            state: RwLock::new(WorkerState::Parsed),
            lifecycle: Mutex::new(()),
            skip_waiting: AtomicBool::new(false),
            generations,
            preloader,
            engine,
            notifications,
            clients,
            background,
        })
    }
}

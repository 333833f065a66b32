//! Client windows.
//!
//! The platform owns the open pages; the worker only enumerates, focuses,
//! opens, and claims them through [`WindowClients`].

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::{Result, ServiceWorkerError};

/// An open window of the app.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Current URL.
    pub url: Url,

    /// Whether the page is under this worker's control.
    pub controlled: bool,

    /// Whether focused.
    pub focused: bool,
}

/// Options for [`WindowClients::match_all`].
#[derive(Debug, Clone, Default)]
pub struct ClientMatchOptions {
    pub include_uncontrolled: bool,
}

impl ClientMatchOptions {
    /// Every window, controlled or not.
    pub fn all_windows() -> Self {
        Self {
            include_uncontrolled: true,
        }
    }
}

/// The platform's view of open clients.
#[async_trait]
pub trait WindowClients: Send + Sync {
    /// Enumerate windows.
    async fn match_all(&self, options: ClientMatchOptions) -> Result<Vec<Client>>;

    /// Bring a window to the foreground.
    async fn focus(&self, id: &str) -> Result<Client>;

    /// Open a new top-level window.
    async fn open_window(&self, url: &Url) -> Result<Client>;

    /// Take control of every uncontrolled same-origin client. Returns how
    /// many were claimed.
    async fn claim(&self) -> Result<usize>;
}

/// In-memory client registry for one origin.
#[derive(Debug)]
pub struct MemoryClients {
    origin: Url,
    clients: RwLock<HashMap<String, Client>>,
}

impl MemoryClients {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Register an already open page. Returns its ID.
    pub async fn add_window(&self, url: Url, controlled: bool) -> String {
        let client = Client {
            id: next_client_id(),
            url,
            controlled,
            focused: false,
        };
        let id = client.id.clone();
        self.clients.write().await.insert(id.clone(), client);
        id
    }

    /// Get a client by ID.
    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    /// Number of known clients.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

#[async_trait]
impl WindowClients for MemoryClients {
    async fn match_all(&self, options: ClientMatchOptions) -> Result<Vec<Client>> {
        let clients = self.clients.read().await;
        let mut matched: Vec<Client> = clients
            .values()
            .filter(|c| options.include_uncontrolled || c.controlled)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    async fn focus(&self, id: &str) -> Result<Client> {
        let mut clients = self.clients.write().await;
        if !clients.contains_key(id) {
            return Err(ServiceWorkerError::ClientError(format!("no client {}", id)));
        }

        for client in clients.values_mut() {
            client.focused = client.id == id;
        }
        let client = clients
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceWorkerError::ClientError(format!("no client {}", id)))?;
        debug!(client = %id, url = %client.url, "Focused window");
        Ok(client)
    }

    async fn open_window(&self, url: &Url) -> Result<Client> {
        let client = Client {
            id: next_client_id(),
            url: url.clone(),
            controlled: url.origin() == self.origin.origin(),
            focused: true,
        };

        let mut clients = self.clients.write().await;
        for other in clients.values_mut() {
            other.focused = false;
        }
        clients.insert(client.id.clone(), client.clone());
        debug!(client = %client.id, url = %url, "Opened window");
        Ok(client)
    }

    async fn claim(&self) -> Result<usize> {
        let mut claimed = 0;
        for client in self.clients.write().await.values_mut() {
            if !client.controlled && client.url.origin() == self.origin.origin() {
                client.controlled = true;
                claimed += 1;
            }
        }
        Ok(claimed)
    }
}

/// Generate a client ID.
fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{:06}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

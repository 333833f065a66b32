//! Push notifications and click routing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use appshell_common::WorkerConfig;
use async_trait::async_trait;
use chrono::Utc;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::clients::{Client, ClientMatchOptions, WindowClients};
use crate::Result;

/// Data attached to a notification and handed back on click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Where a click should lead (path or absolute URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Producer-defined fields, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// Inbound push payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tag: Option<String>,
    pub data: Option<NotificationData>,
}

impl PushPayload {
    /// Parse a raw payload. Absent or malformed payloads yield the empty
    /// payload, which displays with default content. Within a JSON object,
    /// each recognized field is read on its own; a mistyped field is
    /// dropped without discarding the others.
    pub fn parse(raw: Option<&[u8]>) -> Self {
        let Some(bytes) = raw else {
            debug!("Push event without payload");
            return Self::default();
        };
        let fields = match serde_json::from_slice::<JsonValue>(bytes) {
            Ok(JsonValue::Object(fields)) => fields,
            Ok(_) => {
                warn!("Push payload is not a JSON object, using defaults");
                return Self::default();
            }
            Err(e) => {
                warn!(error = %e, "Malformed push payload, using defaults");
                return Self::default();
            }
        };

        let text = |name: &str| match fields.get(name) {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::String(value)) => Some(value.clone()),
            Some(other) => {
                warn!(field = name, value = %other, "Ignoring mistyped push field");
                None
            }
        };
        let data = match fields.get("data") {
            None | Some(JsonValue::Null) => None,
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| warn!(error = %e, "Ignoring mistyped push data"))
                .ok(),
        };

        Self {
            title: text("title"),
            body: text("body"),
            tag: text("tag"),
            data,
        }
    }
}

/// A displayed notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
    pub renotify: bool,
    pub data: NotificationData,
}

/// A click on a displayed notification.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationClick {
    pub tag: String,
    pub data: NotificationData,
}

impl From<&Notification> for NotificationClick {
    fn from(notification: &Notification) -> Self {
        Self {
            tag: notification.tag.clone(),
            data: notification.data.clone(),
        }
    }
}

/// How a click was routed.
#[derive(Debug, Clone)]
pub enum ClickOutcome {
    /// An open dashboard window was brought to the foreground.
    Focused(Client),
    /// A new window was opened.
    Opened(Client),
}

impl ClickOutcome {
    pub fn client(&self) -> &Client {
        match self {
            ClickOutcome::Focused(c) | ClickOutcome::Opened(c) => c,
        }
    }
}

/// The platform's notification center.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    /// Display a notification, replacing any with the same tag.
    async fn show(&self, notification: Notification) -> Result<()>;

    /// Dismiss the notification with this tag. Returns whether it was shown.
    async fn close(&self, tag: &str) -> Result<bool>;
}

/// In-memory notification center.
#[derive(Debug, Default)]
pub struct MemoryNotificationCenter {
    active: RwLock<HashMap<String, Notification>>,
}

impl MemoryNotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notification currently displayed under a tag.
    pub async fn get(&self, tag: &str) -> Option<Notification> {
        self.active.read().await.get(tag).cloned()
    }

    /// Number of notifications currently displayed.
    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }
}

#[async_trait]
impl NotificationCenter for MemoryNotificationCenter {
    async fn show(&self, notification: Notification) -> Result<()> {
        self.active
            .write()
            .await
            .insert(notification.tag.clone(), notification);
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<bool> {
        Ok(self.active.write().await.remove(tag).is_some())
    }
}

/// Turns pushes into notifications and clicks into focused windows.
pub struct NotificationDispatcher {
    config: Arc<WorkerConfig>,
    center: Arc<dyn NotificationCenter>,
    clients: Arc<dyn WindowClients>,
}

impl NotificationDispatcher {
    pub fn new(
        config: Arc<WorkerConfig>,
        center: Arc<dyn NotificationCenter>,
        clients: Arc<dyn WindowClients>,
    ) -> Self {
        Self {
            config,
            center,
            clients,
        }
    }

    /// Display a notification for a push. Completes once it is shown.
    pub async fn on_push(&self, raw: Option<&[u8]>) -> Result<Notification> {
        let notification = self.build(PushPayload::parse(raw));
        self.center.show(notification.clone()).await?;
        info!(tag = %notification.tag, title = %notification.title, "Notification shown");
        Ok(notification)
    }

    /// Route a click to an open dashboard window or a new one.
    pub async fn on_click(&self, click: NotificationClick) -> Result<ClickOutcome> {
        if let Err(e) = self.center.close(&click.tag).await {
            warn!(tag = %click.tag, error = %e, "Failed to dismiss notification");
        }

        let target = self.target_url(&click.data)?;

        let windows = self
            .clients
            .match_all(ClientMatchOptions::all_windows())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Could not enumerate windows");
                Vec::new()
            });

        let dashboard = windows.into_iter().find(|c| {
            self.config
                .window_match
                .matches(&c.url, &self.config.dashboard_path)
        });

        if let Some(window) = dashboard {
            match self.clients.focus(&window.id).await {
                Ok(focused) => {
                    debug!(client = %focused.id, "Focused dashboard window");
                    return Ok(ClickOutcome::Focused(focused));
                }
                Err(e) => {
                    warn!(client = %window.id, error = %e, "Focus failed, opening new window");
                }
            }
        }

        let opened = self.clients.open_window(&target).await?;
        debug!(client = %opened.id, url = %target, "Opened window for notification");
        Ok(ClickOutcome::Opened(opened))
    }

    fn build(&self, payload: PushPayload) -> Notification {
        let defaults = &self.config.notification;
        Notification {
            title: payload
                .title
                .unwrap_or_else(|| defaults.default_title.clone()),
            body: payload.body.unwrap_or_default(),
            tag: payload
                .tag
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| self.generate_tag()),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            require_interaction: true,
            renotify: true,
            data: payload.data.unwrap_or_default(),
        }
    }

    /// Time-based tag so untagged pushes never coalesce.
    fn generate_tag(&self) -> String {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);
        format!(
            "{}-{}-{}",
            self.config.notification.tag_prefix,
            Utc::now().timestamp_millis(),
            SEQUENCE.fetch_add(1, Ordering::Relaxed)
        )
    }

    /// Absolute click target: `data.url` or the dashboard, resolved against
    /// the worker's origin.
    fn target_url(&self, data: &NotificationData) -> Result<Url> {
        let dashboard = &self.config.dashboard_path;
        let resolved = match data.url.as_deref() {
            Some(url) => self.config.resolve(url).or_else(|e| {
                warn!(url, error = %e, "Unusable notification URL, using dashboard");
                self.config.resolve(dashboard)
            }),
            None => self.config.resolve(dashboard),
        };
        Ok(resolved?)
    }
}

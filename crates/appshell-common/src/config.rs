//! Worker configuration.
//!
//! A [`WorkerConfig`] is built once at startup and shared by every
//! component. Nothing mutates it afterwards; redeploying with a new
//! `generation` is the only way to invalidate cached content.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::{Result, ShellError};

/// Immutable configuration for one worker instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// The worker's own origin. Only same-origin requests are cached.
    pub origin: Url,

    /// Current cache generation identifier.
    pub generation: String,

    /// App shell manifest: paths that must be cached before activation.
    pub manifest: Vec<String>,

    /// Path prefix of the API that must never be cached.
    pub api_prefix: String,

    /// Offline fallback page (must be part of the manifest).
    pub offline_page: String,

    /// Dashboard path used for notification click routing.
    pub dashboard_path: String,

    /// Notification display defaults.
    pub notification: NotificationDefaults,

    /// How an open window is matched against the dashboard path.
    pub window_match: WindowMatch,
}

/// Fixed presentation used for every displayed notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Title used when the push payload has none.
    pub default_title: String,

    /// Notification icon path.
    pub icon: String,

    /// Notification badge path.
    pub badge: String,

    /// Vibration pattern in milliseconds (vibrate, pause, vibrate, ...).
    pub vibrate: Vec<u32>,

    /// Prefix for generated time-based tags.
    pub tag_prefix: String,
}

/// Window matching policy for notification clicks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMatch {
    /// The window's path starts with the dashboard path.
    #[default]
    Prefix,
    /// The window's full URL contains the dashboard path anywhere.
    Substring,
}

impl WindowMatch {
    /// Check whether a window URL shows the dashboard.
    pub fn matches(&self, window_url: &Url, dashboard_path: &str) -> bool {
        match self {
            WindowMatch::Prefix => window_url.path().starts_with(dashboard_path),
            WindowMatch::Substring => window_url.as_str().contains(dashboard_path),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:8080/").expect("static origin is valid"),
            generation: "appshell-v1".to_string(),
            manifest: [
                "/",
                "/index.html",
                "/css/styles.css",
                "/js/app.js",
                "/icons/icon-192.png",
                "/icons/icon-512.png",
                "/manifest.json",
                "/offline.html",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            api_prefix: "/api/".to_string(),
            offline_page: "/offline.html".to_string(),
            dashboard_path: "/dashboard".to_string(),
            notification: NotificationDefaults::default(),
            window_match: WindowMatch::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            default_title: "New notification".to_string(),
            icon: "/icons/icon-192.png".to_string(),
            badge: "/icons/badge-72.png".to_string(),
            vibrate: vec![200, 100, 200],
            tag_prefix: "notification".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    /// Builder-style override of the generation identifier.
    pub fn with_generation(mut self, generation: impl Into<String>) -> Self {
        self.generation = generation.into();
        self
    }

    /// Builder-style override of the origin.
    pub fn with_origin(mut self, origin: Url) -> Self {
        self.origin = origin;
        self
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.origin.scheme(), "http" | "https") || self.origin.host().is_none() {
            return Err(ShellError::config(format!(
                "origin must be an absolute http(s) URL, got {}",
                self.origin
            )));
        }
        if self.generation.trim().is_empty() {
            return Err(ShellError::config("generation identifier is empty"));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(ShellError::config("api_prefix must start with '/'"));
        }
        if !self.manifest.iter().any(|p| p == &self.offline_page) {
            return Err(ShellError::config(format!(
                "offline page {} is not part of the shell manifest",
                self.offline_page
            )));
        }
        for path in &self.manifest {
            let url = self.resolve(path)?;
            if !self.is_same_origin(&url) {
                return Err(ShellError::config(format!(
                    "manifest entry {} is not same-origin",
                    path
                )));
            }
        }
        Ok(())
    }

    /// Resolve a path (or absolute URL) against the worker's origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Absolute URLs of the shell manifest, in manifest order.
    pub fn manifest_urls(&self) -> Result<Vec<Url>> {
        self.manifest.iter().map(|p| self.resolve(p)).collect()
    }

    /// Absolute URL of the offline fallback page.
    pub fn offline_url(&self) -> Result<Url> {
        self.resolve(&self.offline_page)
    }

    /// Whether a URL shares the worker's origin.
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    /// Whether a URL's path falls under the API prefix.
    pub fn is_api_path(&self, url: &Url) -> bool {
        url.path().starts_with(&self.api_prefix)
    }
}

//! # AppShell Common
//!
//! Shared error types, configuration, and logging setup for the AppShell
//! offline interception layer.
//!
//! ## Features
//!
//! - Unified error type for configuration and I/O failures
//! - Immutable worker configuration (origin, generation, shell manifest)
//! - Logging configuration and setup

use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::{NotificationDefaults, WindowMatch, WorkerConfig};
pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for configuration and setup.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON documents.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse failures.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl ShellError {
    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            ShellError::Config { .. } => "config",
            ShellError::Io(_) => "io",
            ShellError::Json(_) => "json",
            ShellError::Url(_) => "url",
        }
    }
}

/// Result type alias for AppShell setup operations.
pub type Result<T> = std::result::Result<T, ShellError>;

//! Detached background work.
//!
//! Cache writes that must not delay a response run here. Their failures are
//! logged and never reach the caller that is waiting on the primary response.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::Result;

/// Tracker for spawned background tasks.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task on the current runtime.
    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            match task.await {
                Ok(()) => trace!(task = label, "Background task finished"),
                Err(e) => warn!(task = label, error = %e, "Background task failed"),
            }
        });

        let mut handles = self.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait until every tracked task settles, including tasks spawned while
    /// waiting.
    pub async fn settle(&self) {
        loop {
            let drained: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock());
            if drained.is_empty() {
                return;
            }
            for handle in drained {
                if let Err(e) = handle.await {
                    error!(error = %e, "Background task panicked");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        // The guarded Vec has no invariant a panic could break.
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

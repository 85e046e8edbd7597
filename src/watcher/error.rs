//! Error types for the watch/debounce/reload core.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from watcher operations.
///
/// Only [`WatchError::InitFailed`] is fatal to the daemon. Everything else is
/// logged by the event loop and the loop keeps running.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch {path}: {source}")]
    PathWatchFailed {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("File system event error: {0}")]
    Event(#[source] notify::Error),

    #[error("Failed to reload config: {0}")]
    Reload(#[from] ConfigError),
}

impl WatchError {
    /// Whether the daemon has to stop because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WatchError::InitFailed { .. })
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

//! Collaborator seams consumed by the event loop.
//!
//! The daemon never touches configuration storage or the network directly.
//! It reads watch roots through a [`ConfigSource`] and hands debounced files
//! to an [`Uploader`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::api::TransportError;
use crate::config::ConfigError;

/// Source of the directories to watch.
///
/// Owned by the event loop and only called from the control task.
pub trait ConfigSource: Send {
    /// Path of the configuration file backing this source.
    ///
    /// The config monitor watches its parent directory and filters events by
    /// this file's name.
    fn config_path(&self) -> &Path;

    /// Currently configured watch roots, in declaration order.
    fn watch_directories(&self) -> Vec<PathBuf>;

    /// Re-read configuration from disk.
    ///
    /// On error the previously loaded configuration must remain in effect.
    fn reload(&mut self) -> Result<(), ConfigError>;
}

/// Receiver of debounced file changes.
///
/// Called from short-lived tasks spawned by the debounce registry, never from
/// the control task.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload one file by absolute path.
    async fn upload(&self, path: &Path) -> Result<(), TransportError>;
}

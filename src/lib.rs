//! Sync agent for Semantic File Search.
//!
//! Watches configured directory trees, debounces bursts of writes per file
//! and uploads each settled file to the indexing API. Edits to the config
//! file take effect without a restart.

pub mod api;
pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use api::{ApiClient, TransportError};
pub use config::{Settings, SettingsSource, SharedSettings};
pub use watcher::{ConfigSource, Daemon, DebounceRegistry, ShutdownPolicy, Uploader, WatchError};

//! Watches the configuration file for changes.
//!
//! Editors and config writers often replace the file instead of writing it in
//! place, so the monitor watches the containing directory and filters events
//! by file name.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};

use super::error::WatchError;
use super::filter::{ChangeEvent, ChangeKind};
use super::watch_set::{ErrorRx, EventRx, notify_watcher};

/// Directory-scoped watch on the configuration file.
pub struct ConfigMonitor {
    watcher: RecommendedWatcher,
    config_path: PathBuf,
    config_dir: PathBuf,
    file_name: OsString,
    /// Whether the directory watch was registered.
    active: bool,
    pub(super) events: EventRx,
    pub(super) errors: ErrorRx,
}

impl ConfigMonitor {
    /// Start monitoring `config_path`.
    ///
    /// The containing directory is created if missing. Failing to watch it is
    /// logged and leaves the monitor inactive; only failure to create the
    /// notification primitive is returned as an error.
    pub fn new(config_path: &Path) -> Result<Self, WatchError> {
        let config_path = std::path::absolute(config_path).map_err(|e| WatchError::InitFailed {
            reason: format!("cannot resolve config path {}: {e}", config_path.display()),
        })?;

        let file_name = config_path
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| WatchError::InitFailed {
                reason: format!("config path {} has no file name", config_path.display()),
            })?;

        let config_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            tracing::warn!(
                "[config] could not create config directory {}: {e}",
                config_dir.display()
            );
        }

        let (mut watcher, events, errors) = notify_watcher()?;

        let active = match watcher.watch(&config_dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                crate::log_event!("config", "watching", "{}", config_path.display());
                true
            }
            Err(e) => {
                tracing::warn!(
                    "[config] could not watch config directory {}: {e}",
                    config_dir.display()
                );
                false
            }
        };

        Ok(Self {
            watcher,
            config_path,
            config_dir,
            file_name,
            active,
            events,
            errors,
        })
    }

    /// The monitored configuration file.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Whether the directory watch is registered.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Check whether an event concerns the configuration file at all.
    pub fn is_config_file(&self, event: &ChangeEvent) -> bool {
        event.path.file_name() == Some(self.file_name.as_os_str())
    }

    /// Check whether an event should trigger a configuration reload.
    ///
    /// A rename counts only when it moved a file into place (atomic saves),
    /// not when the config file was moved away.
    pub fn should_reload(&self, event: &ChangeEvent) -> bool {
        if !self.is_config_file(event) {
            return false;
        }
        match event.kind {
            ChangeKind::Rename => event.path.is_file(),
            _ => event.is_write_or_create(),
        }
    }

    /// Release the directory watch.
    ///
    /// Receivers are dropped before the watcher so a notify thread blocked on
    /// a full buffer is released rather than waited on.
    pub fn close(self) {
        let Self {
            watcher,
            config_dir,
            events,
            errors,
            ..
        } = self;

        drop(events);
        drop(errors);
        drop(watcher);

        crate::debug_event!("config", "monitor closed", "{}", config_dir.display());
    }
}

//! Configuration for the sync daemon and CLI.
//!
//! Settings are layered:
//! - Default values
//! - TOML configuration file (`<config dir>/sfs/config.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SFS_` and use double
//! underscores to separate nested levels:
//! - `SFS_API_URL=https://search.example.com` sets `api_url`
//! - `SFS_DAEMON__DEBOUNCE_MS=250` sets `daemon.debounce_ms`
//! - `SFS_LOGGING__DEFAULT=debug` sets `logging.default`

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::watcher::{ConfigSource, ShutdownPolicy};

/// Directory under the platform config dir that holds our files.
pub const CONFIG_DIR_NAME: &str = "sfs";
/// Name of the configuration file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Keys accepted by `sfs config get/set`.
pub const SETTABLE_KEYS: &[&str] = &["api_url", "api_key", "debounce_ms", "on_shutdown"];

/// Errors from loading, saving or editing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config from {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: Box<figment::Error>,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("Config file {path} is empty; keeping previous settings")]
    EmptyFile { path: PathBuf },

    #[error("Could not determine the user configuration directory")]
    NoConfigDir,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Base URL of the Semantic File Search API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key sent as `X-API-Key`
    #[serde(default)]
    pub api_key: String,

    /// Directories watched by the daemon, including all subdirectories
    #[serde(default)]
    pub watch_dirs: Vec<PathBuf>,

    /// Daemon behavior
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DaemonConfig {
    /// Quiet period after the last write before a file is uploaded
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// What to do with pending uploads when the daemon stops
    #[serde(default)]
    pub on_shutdown: ShutdownPolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `sfs::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_api_url() -> String {
    "https://localhost".to_string()
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            watch_dirs: Vec::new(),
            daemon: DaemonConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            on_shutdown: ShutdownPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load configuration from a specific file.
    ///
    /// A missing file yields defaults (plus environment overrides); a file
    /// that exists but does not parse is an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nesting, single underscore stays
            .merge(Env::prefixed("SFS_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load {
                path: path.to_path_buf(),
                source: Box::new(e),
            })
    }

    /// Save current configuration to file, readable only by the owner.
    ///
    /// The TOML is written to a temporary file in the same directory (created
    /// with owner-only permissions) and renamed over the target, so a reader
    /// never sees a truncated or half-written file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;

        let toml_string = toml::to_string_pretty(self)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".config-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            staged
                .as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }

        staged.write_all(toml_string.as_bytes()).map_err(io_err)?;
        staged.as_file().sync_all().map_err(io_err)?;
        staged.persist(path).map_err(|e| io_err(e.error))?;

        Ok(())
    }

    /// The debounce quiet period.
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.daemon.debounce_ms)
    }

    /// Add a watch directory.
    ///
    /// The path is made absolute and must be an existing directory. Returns
    /// `Ok(false)` if it was already present.
    pub fn add_watch_dir(&mut self, dir: &Path) -> Result<bool, ConfigError> {
        let absolute = absolute_path(dir)?;

        let meta = std::fs::metadata(&absolute).map_err(|_| ConfigError::Invalid {
            key: "watch_dirs".to_string(),
            reason: format!("directory does not exist: {}", absolute.display()),
        })?;
        if !meta.is_dir() {
            return Err(ConfigError::Invalid {
                key: "watch_dirs".to_string(),
                reason: format!("path is not a directory: {}", absolute.display()),
            });
        }

        if self.watch_dirs.contains(&absolute) {
            return Ok(false);
        }

        self.watch_dirs.push(absolute);
        Ok(true)
    }

    /// Remove a watch directory. Returns `Ok(false)` if it was not present.
    pub fn remove_watch_dir(&mut self, dir: &Path) -> Result<bool, ConfigError> {
        let absolute = absolute_path(dir)?;
        let before = self.watch_dirs.len();
        self.watch_dirs.retain(|existing| existing != &absolute);
        Ok(self.watch_dirs.len() != before)
    }

    /// Read a single setting by key.
    pub fn get_value(&self, key: &str) -> Result<String, ConfigError> {
        match key {
            "api_url" => Ok(self.api_url.clone()),
            "api_key" => Ok(self.api_key.clone()),
            "debounce_ms" => Ok(self.daemon.debounce_ms.to_string()),
            "on_shutdown" => Ok(self.daemon.on_shutdown.to_string()),
            _ => Err(unknown_key(key)),
        }
    }

    /// Update a single setting by key.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "api_url" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(ConfigError::Invalid {
                        key: key.to_string(),
                        reason: "must start with http:// or https://".to_string(),
                    });
                }
                self.api_url = value.trim_end_matches('/').to_string();
            }
            "api_key" => self.api_key = value.to_string(),
            "debounce_ms" => {
                self.daemon.debounce_ms = value.parse().map_err(|e| ConfigError::Invalid {
                    key: key.to_string(),
                    reason: format!("{e}"),
                })?;
            }
            "on_shutdown" => {
                self.daemon.on_shutdown =
                    value.parse().map_err(|reason| ConfigError::Invalid {
                        key: key.to_string(),
                        reason,
                    })?;
            }
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    /// Copy suitable for display, with the API key masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.api_key.is_empty() {
            let tail: String = copy
                .api_key
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            copy.api_key = format!("****{tail}");
        }
        copy
    }
}

fn absolute_path(dir: &Path) -> Result<PathBuf, ConfigError> {
    std::path::absolute(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn unknown_key(key: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("unknown key (expected one of: {})", SETTABLE_KEYS.join(", ")),
    }
}

/// Settings snapshot shared between the config source and the API client.
///
/// Readers clone the inner `Arc` and never hold the lock across I/O.
pub type SharedSettings = Arc<RwLock<Arc<Settings>>>;

/// File-backed [`ConfigSource`] used by the daemon.
pub struct SettingsSource {
    path: PathBuf,
    current: SharedSettings,
}

impl SettingsSource {
    /// Load settings from `path` and wrap them as a config source.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings = Settings::load_from(&path)?;
        Ok(Self {
            path,
            current: Arc::new(RwLock::new(Arc::new(settings))),
        })
    }

    /// Handle to the live settings snapshot.
    pub fn shared(&self) -> SharedSettings {
        Arc::clone(&self.current)
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read())
    }
}

impl ConfigSource for SettingsSource {
    fn config_path(&self) -> &Path {
        &self.path
    }

    fn watch_directories(&self) -> Vec<PathBuf> {
        self.current.read().watch_dirs.clone()
    }

    fn reload(&mut self) -> Result<(), ConfigError> {
        // A zero-length file is a writer caught between truncate and write,
        // not a request to drop every setting.
        if matches!(std::fs::metadata(&self.path), Ok(meta) if meta.len() == 0) {
            return Err(ConfigError::EmptyFile {
                path: self.path.clone(),
            });
        }

        let settings = Settings::load_from(&self.path)?;
        *self.current.write() = Arc::new(settings);
        Ok(())
    }
}

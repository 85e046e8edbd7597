//! Watch, debounce and reload core of the sync daemon.
//!
//! # Architecture
//!
//! ```text
//! Daemon (single control task)
//!   - ConfigMonitor: watches the config file's directory
//!   - WatchSet: one non-recursive watch per expanded directory
//!   - DebounceRegistry: one pending upload per path
//!         |
//!   ConfigSource (reload, roots)      Uploader (debounced files)
//! ```

mod config_monitor;
mod daemon;
mod debouncer;
mod error;
mod expander;
mod filter;
mod source;
mod watch_set;

pub use config_monitor::ConfigMonitor;
pub use daemon::{Daemon, DaemonBuilder, DaemonState};
pub use debouncer::{DEFAULT_QUIET_PERIOD, DebounceRegistry, ShutdownPolicy};
pub use error::WatchError;
pub use expander::expand;
pub use filter::{ChangeEvent, ChangeKind, Rejection, check_upload_candidate, is_backup_file};
pub use source::{ConfigSource, Uploader};
pub use watch_set::WatchSet;

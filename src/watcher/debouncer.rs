//! Per-path debouncing of file writes into single uploads.
//!
//! Every write to a path restarts that path's quiet-period timer. When a timer
//! expires without being replaced, the file is handed to the [`Uploader`].
//! Saving a file usually produces several writes in quick succession (editor
//! truncate + write, auto-save, formatters); they collapse into one upload
//! fired a quiet period after the last write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use super::source::Uploader;

/// Default quiet period between the last write and the upload.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// What happens to pending uploads when the daemon stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownPolicy {
    /// Drop pending timers without uploading.
    #[default]
    Abandon,
    /// Upload every pending path immediately, then stop.
    Flush,
}

impl std::fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPolicy::Abandon => write!(f, "abandon"),
            ShutdownPolicy::Flush => write!(f, "flush"),
        }
    }
}

impl std::str::FromStr for ShutdownPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abandon" => Ok(ShutdownPolicy::Abandon),
            "flush" => Ok(ShutdownPolicy::Flush),
            other => Err(format!(
                "invalid shutdown policy '{other}' (expected 'abandon' or 'flush')"
            )),
        }
    }
}

/// A scheduled upload for one path.
#[derive(Debug)]
struct PendingUpload {
    /// Identifies the timer task that owns this entry.
    generation: u64,
    /// When the timer fires if not replaced.
    deadline: Instant,
    handle: JoinHandle<()>,
}

type PendingMap = HashMap<PathBuf, PendingUpload>;

/// Registry of pending uploads, at most one per path.
///
/// The map is shared between the event loop (which triggers and cancels) and
/// the timer tasks (which remove their own entry when they fire). The lock is
/// held only while the map is mutated, never across an upload.
pub struct DebounceRegistry {
    pending: Arc<Mutex<PendingMap>>,
    uploader: Arc<dyn Uploader>,
    quiet_period: Duration,
    next_generation: AtomicU64,
}

impl DebounceRegistry {
    /// Create a registry with the given uploader and quiet period.
    pub fn new(uploader: Arc<dyn Uploader>, quiet_period: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            uploader,
            quiet_period,
            next_generation: AtomicU64::new(0),
        }
    }

    /// The configured quiet period.
    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Record a write to `path`, (re)starting its quiet-period timer.
    ///
    /// Any timer already pending for the path is cancelled and replaced.
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self, path: PathBuf) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + self.quiet_period;

        let mut pending = self.pending.lock();

        if let Some(previous) = pending.remove(&path) {
            previous.handle.abort();
            crate::debug_event!("debounce", "reset", "{}", path.display());
        } else {
            crate::debug_event!("debounce", "scheduled", "{}", path.display());
        }

        let handle = tokio::spawn(fire_after(
            Arc::clone(&self.pending),
            Arc::clone(&self.uploader),
            path.clone(),
            generation,
            deadline,
        ));

        pending.insert(
            path,
            PendingUpload {
                generation,
                deadline,
                handle,
            },
        );
    }

    /// Cancel the pending upload for `path`, if any.
    ///
    /// Returns true if an entry was removed. A timer that already claimed its
    /// entry is past cancellation and will upload.
    pub fn cancel(&self, path: &Path) -> bool {
        match self.pending.lock().remove(path) {
            Some(entry) => {
                entry.handle.abort();
                crate::debug_event!("debounce", "cancelled", "{}", path.display());
                true
            }
            None => false,
        }
    }

    /// Check whether an upload is pending for `path`.
    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.lock().contains_key(path)
    }

    /// When the pending upload for `path` will fire.
    pub fn deadline(&self, path: &Path) -> Option<Instant> {
        self.pending.lock().get(path).map(|entry| entry.deadline)
    }

    /// Get the number of pending uploads.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Stop every pending timer according to `policy`.
    ///
    /// With [`ShutdownPolicy::Flush`] the pending paths are uploaded right
    /// away and this returns once all of those uploads have finished.
    pub async fn shutdown(&self, policy: ShutdownPolicy) {
        let drained: Vec<PathBuf> = {
            let mut pending = self.pending.lock();
            pending
                .drain()
                .map(|(path, entry)| {
                    entry.handle.abort();
                    path
                })
                .collect()
        };

        if drained.is_empty() {
            return;
        }

        match policy {
            ShutdownPolicy::Abandon => {
                crate::log_event!("debounce", "abandoned", "{} pending uploads", drained.len());
            }
            ShutdownPolicy::Flush => {
                crate::log_event!("debounce", "flushing", "{} pending uploads", drained.len());
                for path in drained {
                    run_upload(self.uploader.as_ref(), &path).await;
                }
            }
        }
    }
}

impl Drop for DebounceRegistry {
    fn drop(&mut self) {
        for (_, entry) in self.pending.lock().drain() {
            entry.handle.abort();
        }
    }
}

/// Timer task body: wait out the quiet period, claim the entry, upload.
async fn fire_after(
    pending: Arc<Mutex<PendingMap>>,
    uploader: Arc<dyn Uploader>,
    path: PathBuf,
    generation: u64,
    deadline: Instant,
) {
    tokio::time::sleep_until(deadline).await;

    // Claim the entry only if it is still ours. A replacement that raced the
    // abort owns the entry now and this timer must not upload.
    let claimed = {
        let mut pending = pending.lock();
        let owned = pending
            .get(&path)
            .is_some_and(|entry| entry.generation == generation);
        if owned {
            pending.remove(&path);
        }
        owned
    };

    if claimed {
        run_upload(uploader.as_ref(), &path).await;
    } else {
        crate::debug_event!("debounce", "superseded", "{}", path.display());
    }
}

async fn run_upload(uploader: &dyn Uploader, path: &Path) {
    crate::log_event!("upload", "sending", "{}", path.display());
    match uploader.upload(path).await {
        Ok(()) => crate::log_event!("upload", "done", "{}", path.display()),
        Err(e) => tracing::error!("[upload] failed for {}: {e}", path.display()),
    }
}

/// Wait long enough for every timer scheduled so far to have fired.
///
/// Test helper for paused-clock tests.
#[cfg(test)]
pub(crate) async fn settle(quiet_period: Duration) {
    tokio::time::sleep(quiet_period + Duration::from_millis(1)).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

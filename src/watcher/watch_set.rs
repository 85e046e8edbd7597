//! The live set of OS directory watches.
//!
//! A [`WatchSet`] owns one `notify::RecommendedWatcher` with a non-recursive
//! registration per directory. It is never patched in place: configuration
//! changes build a complete replacement and close the old one.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::error::WatchError;

/// Buffered notify events per watcher before the notify thread waits.
const EVENT_BUFFER: usize = 1024;

pub(super) type EventRx = mpsc::Receiver<Event>;
pub(super) type ErrorRx = mpsc::UnboundedReceiver<notify::Error>;

/// Create a notify watcher whose events and errors land on separate channels.
///
/// Errors go through an unbounded channel so a burst of errors never stalls
/// event delivery, and a full event buffer never drops errors.
pub(super) fn notify_watcher() -> Result<(RecommendedWatcher, EventRx, ErrorRx), WatchError> {
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (error_tx, error_rx) = mpsc::unbounded_channel();

    let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let _ = event_tx.blocking_send(event);
        }
        Err(e) => {
            let _ = error_tx.send(e);
        }
    })?;

    Ok((watcher, event_rx, error_rx))
}

/// Active directory watches plus the channels they report on.
pub struct WatchSet {
    watcher: RecommendedWatcher,
    /// Directories that were successfully registered.
    watched: BTreeSet<PathBuf>,
    pub(super) events: EventRx,
    pub(super) errors: ErrorRx,
}

impl WatchSet {
    /// Subscribe to every directory in `dirs`.
    ///
    /// Individual directories that cannot be watched are logged and left out.
    /// Only failure to create the notification primitive itself is an error.
    pub fn build(dirs: &BTreeSet<PathBuf>) -> Result<Self, WatchError> {
        let (mut watcher, events, errors) = notify_watcher()?;
        let mut watched = BTreeSet::new();

        for dir in dirs {
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    crate::debug_event!("watcher", "watching", "{}", dir.display());
                    watched.insert(dir.clone());
                }
                Err(e) => {
                    let err = WatchError::PathWatchFailed {
                        path: dir.clone(),
                        source: e,
                    };
                    tracing::warn!("[watcher] {err}");
                }
            }
        }

        if watched.len() < dirs.len() {
            tracing::warn!(
                "[watcher] {} of {} directories could not be watched",
                dirs.len() - watched.len(),
                dirs.len()
            );
        }

        Ok(Self {
            watcher,
            watched,
            events,
            errors,
        })
    }

    /// Directories currently covered.
    pub fn directories(&self) -> &BTreeSet<PathBuf> {
        &self.watched
    }

    /// Check if a directory is covered by this set.
    pub fn contains(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    /// Get count of watched directories.
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Take every event already queued on this set without waiting.
    ///
    /// Bounded so a directory under constant churn cannot keep the caller
    /// here indefinitely.
    pub fn drain_queued(&mut self) -> Vec<Event> {
        let mut queued = Vec::new();
        while queued.len() < EVENT_BUFFER * 4 {
            match self.events.try_recv() {
                Ok(event) => queued.push(event),
                Err(_) => break,
            }
        }
        queued
    }

    /// Release every subscription.
    ///
    /// The receivers go first: the notify thread may be parked in
    /// `blocking_send` on a full buffer, and it only wakes once the channel
    /// is closed. Dropping the watcher then releases all OS watches at once,
    /// including directories that have disappeared since registration.
    pub fn close(self) {
        let Self {
            watcher,
            watched,
            events,
            errors,
        } = self;

        drop(events);
        drop(errors);
        drop(watcher);

        crate::debug_event!("watcher", "closed", "{} directories", watched.len());
    }
}

impl std::fmt::Debug for WatchSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSet")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

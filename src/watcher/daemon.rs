//! The daemon event loop.
//!
//! A single control task multiplexes config-file events, watch-set events,
//! both error streams and the shutdown signal. It owns the [`WatchSet`] and
//! the [`DebounceRegistry`]; upload work runs on tasks spawned by the
//! registry and never blocks the loop.
//!
//! ```text
//! ConfigMonitor --(write/create config)--> reload -> expand -> build new WatchSet, close old
//! WatchSet -----(write to regular file)--> DebounceRegistry::trigger -> (quiet period) -> Uploader
//! shutdown -----------------------------> close watches, apply ShutdownPolicy
//! ```

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use notify::Event;
use tokio::time::Duration;

use super::config_monitor::ConfigMonitor;
use super::debouncer::{DEFAULT_QUIET_PERIOD, DebounceRegistry, ShutdownPolicy};
use super::error::WatchError;
use super::expander::expand;
use super::filter::{ChangeEvent, check_upload_candidate};
use super::source::{ConfigSource, Uploader};
use super::watch_set::WatchSet;

/// Lifecycle of the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    Running,
    ShuttingDown,
}

/// Watch/debounce/reload coordinator.
pub struct Daemon {
    source: Box<dyn ConfigSource>,
    registry: DebounceRegistry,
    watch_set: WatchSet,
    monitor: ConfigMonitor,
    shutdown_policy: ShutdownPolicy,
    state: DaemonState,
}

impl Daemon {
    /// Create a builder for configuring the daemon.
    pub fn builder() -> DaemonBuilder {
        DaemonBuilder::new()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Directories covered by the active watch set.
    pub fn watched_directories(&self) -> &BTreeSet<PathBuf> {
        self.watch_set.directories()
    }

    /// The debounce registry driven by this loop.
    pub fn registry(&self) -> &DebounceRegistry {
        &self.registry
    }

    /// Run until `shutdown` resolves.
    ///
    /// Every non-fatal condition is logged and the loop continues. Pending
    /// uploads are handled according to the configured [`ShutdownPolicy`].
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        crate::log_event!(
            "daemon",
            "running",
            "{} directories watched",
            self.watch_set.len()
        );

        while self.state == DaemonState::Running {
            tokio::select! {
                Some(event) = self.monitor.events.recv() => {
                    self.handle_config_event(event);
                }

                Some(err) = self.monitor.errors.recv() => {
                    tracing::warn!("[config] watch error: {err}");
                }

                Some(event) = self.watch_set.events.recv() => {
                    self.handle_watch_event(event);
                }

                Some(err) = self.watch_set.errors.recv() => {
                    let err = WatchError::Event(err);
                    tracing::error!("[watcher] {err}");
                }

                _ = &mut shutdown => {
                    crate::log_event!("daemon", "shutdown requested");
                    self.state = DaemonState::ShuttingDown;
                }
            }
        }

        self.shutdown().await;
    }

    /// Route a config-directory event.
    fn handle_config_event(&mut self, event: Event) {
        for change in ChangeEvent::from_notify(event) {
            if !self.monitor.is_config_file(&change) {
                continue;
            }

            if self.monitor.should_reload(&change) {
                crate::log_event!("config", "changed", "{}", change.path.display());
                self.reload_configuration();
                // One reload covers every path in this event
                return;
            }

            crate::debug_event!("config", "ignored", "{:?} {}", change.kind, change.path.display());
        }
    }

    /// Route a watch-set event through the upload filters.
    fn handle_watch_event(&self, event: Event) {
        for change in ChangeEvent::from_notify(event) {
            self.route_change(change);
        }
    }

    fn route_change(&self, change: ChangeEvent) {
        match check_upload_candidate(&change) {
            Ok(()) => self.registry.trigger(change.path),
            Err(reason) => {
                crate::debug_event!(
                    "watcher",
                    "dropped",
                    "{:?} {:?} {}",
                    reason,
                    change.kind,
                    change.path.display()
                );
            }
        }
    }

    /// Reload configuration and swap in a freshly built watch set.
    ///
    /// On any failure the previous configuration and watch set stay active.
    /// The replacement is fully registered before the old set is closed, so
    /// directories present in both configurations are never unwatched.
    /// Events still queued on the old set are routed before it closes when
    /// their directory is covered by the replacement.
    pub fn reload_configuration(&mut self) {
        if let Err(e) = self.source.reload() {
            let err = WatchError::from(e);
            tracing::warn!("[config] {err}; keeping previous configuration");
            return;
        }

        let roots = self.source.watch_directories();
        let dirs = expand(&roots);

        match WatchSet::build(&dirs) {
            Ok(replacement) => {
                let mut previous = std::mem::replace(&mut self.watch_set, replacement);
                let carried = self.carry_over(&mut previous);
                previous.close();
                crate::log_event!(
                    "config",
                    "reloaded",
                    "{} roots, {} directories watched, {carried} queued events carried over",
                    roots.len(),
                    self.watch_set.len()
                );
            }
            Err(e) => {
                tracing::error!("[watcher] could not rebuild watch set, keeping previous: {e}");
            }
        }
    }

    /// Route events queued on a retiring watch set whose directory is still
    /// watched. Returns how many changes were routed.
    fn carry_over(&self, previous: &mut WatchSet) -> usize {
        let mut carried = 0;
        for event in previous.drain_queued() {
            for change in ChangeEvent::from_notify(event) {
                let still_watched = change
                    .path
                    .parent()
                    .is_some_and(|dir| self.watch_set.contains(dir));
                if still_watched {
                    carried += 1;
                    self.route_change(change);
                }
            }
        }
        carried
    }

    async fn shutdown(self) {
        let Daemon {
            registry,
            watch_set,
            monitor,
            shutdown_policy,
            ..
        } = self;

        watch_set.close();
        monitor.close();
        registry.shutdown(shutdown_policy).await;

        crate::log_event!("daemon", "stopped");
    }
}

/// Builder for constructing a [`Daemon`].
pub struct DaemonBuilder {
    source: Option<Box<dyn ConfigSource>>,
    uploader: Option<Arc<dyn Uploader>>,
    quiet_period: Duration,
    shutdown_policy: ShutdownPolicy,
}

impl DaemonBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            source: None,
            uploader: None,
            quiet_period: DEFAULT_QUIET_PERIOD,
            shutdown_policy: ShutdownPolicy::default(),
        }
    }

    /// Set the configuration source.
    pub fn source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Set the uploader that receives debounced files.
    pub fn uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Set the quiet period.
    pub fn quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }

    /// Set what happens to pending uploads on shutdown.
    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Build the daemon: start the config monitor and the initial watch set.
    ///
    /// Fails only when a collaborator is missing or the OS notification
    /// primitive cannot be created.
    pub fn build(self) -> Result<Daemon, WatchError> {
        let source = self.source.ok_or_else(|| WatchError::InitFailed {
            reason: "Config source is required".to_string(),
        })?;

        let uploader = self.uploader.ok_or_else(|| WatchError::InitFailed {
            reason: "Uploader is required".to_string(),
        })?;

        let monitor = ConfigMonitor::new(source.config_path())?;

        let roots = source.watch_directories();
        let watch_set = WatchSet::build(&expand(&roots))?;

        if roots.is_empty() {
            tracing::warn!("[daemon] no directories configured - add one with 'sfs watch add <dir>'");
        } else {
            crate::log_event!(
                "watcher",
                "monitoring",
                "{} roots in {} directories",
                roots.len(),
                watch_set.len()
            );
        }

        Ok(Daemon {
            source,
            registry: DebounceRegistry::new(uploader, self.quiet_period),
            watch_set,
            monitor,
            shutdown_policy: self.shutdown_policy,
            state: DaemonState::Running,
        })
    }
}

impl Default for DaemonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TransportError;
    use crate::config::ConfigError;
    use async_trait::async_trait;
    use notify::EventKind;
    use notify::event::{CreateKind, DataChange, ModifyKind};
    use parking_lot::Mutex;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// Config source whose next reload result is scripted by the test.
    struct ScriptedSource {
        path: PathBuf,
        dirs: Arc<Mutex<Vec<PathBuf>>>,
        next: Arc<Mutex<Option<Vec<PathBuf>>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl ConfigSource for ScriptedSource {
        fn config_path(&self) -> &Path {
            &self.path
        }

        fn watch_directories(&self) -> Vec<PathBuf> {
            self.dirs.lock().clone()
        }

        fn reload(&mut self) -> Result<(), ConfigError> {
            if *self.fail.lock() {
                return Err(ConfigError::Invalid {
                    key: "watch_dirs".to_string(),
                    reason: "malformed".to_string(),
                });
            }
            if let Some(next) = self.next.lock().take() {
                *self.dirs.lock() = next;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingUploader {
        paths: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Uploader for CountingUploader {
        async fn upload(&self, path: &Path) -> Result<(), TransportError> {
            self.paths.lock().push(path.to_path_buf());
            Ok(())
        }
    }

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        next: Arc<Mutex<Option<Vec<PathBuf>>>>,
        fail: Arc<Mutex<bool>>,
        uploader: Arc<CountingUploader>,
        daemon: Daemon,
    }

    fn fixture(initial: &[&str]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        for name in ["a", "b", "c"] {
            fs::create_dir_all(root.join(name).join("sub")).unwrap();
        }

        let next = Arc::new(Mutex::new(None));
        let fail = Arc::new(Mutex::new(false));
        let source = ScriptedSource {
            path: root.join("cfg").join("config.toml"),
            dirs: Arc::new(Mutex::new(initial.iter().map(|n| root.join(n)).collect())),
            next: next.clone(),
            fail: fail.clone(),
        };
        let uploader = Arc::new(CountingUploader::default());

        let daemon = Daemon::builder()
            .source(source)
            .uploader(uploader.clone())
            .quiet_period(Duration::from_millis(50))
            .build()
            .unwrap();

        Fixture {
            _temp: temp,
            root,
            next,
            fail,
            uploader,
            daemon,
        }
    }

    fn write_event(path: &Path) -> Event {
        Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(path.to_path_buf())
    }

    #[test]
    fn test_builder_requires_collaborators() {
        let result = Daemon::builder().build();
        assert!(matches!(result, Err(WatchError::InitFailed { .. })));
    }

    #[test]
    fn test_initial_watch_set_covers_expanded_roots() {
        let fx = fixture(&["a", "b"]);

        let watched = fx.daemon.watched_directories();
        assert_eq!(watched.len(), 4);
        assert!(watched.contains(&fx.root.join("a").join("sub")));
        assert!(watched.contains(&fx.root.join("b")));
        assert!(!watched.contains(&fx.root.join("c")));
        assert_eq!(fx.daemon.state(), DaemonState::Running);
    }

    #[test]
    fn test_reload_swaps_watch_set() {
        let mut fx = fixture(&["a", "b"]);
        *fx.next.lock() = Some(vec![fx.root.join("b"), fx.root.join("c")]);

        fx.daemon.reload_configuration();

        let watched = fx.daemon.watched_directories();
        assert!(!watched.contains(&fx.root.join("a")));
        assert!(!watched.contains(&fx.root.join("a").join("sub")));
        assert!(watched.contains(&fx.root.join("b").join("sub")));
        assert!(watched.contains(&fx.root.join("c")));
        assert!(watched.contains(&fx.root.join("c").join("sub")));
    }

    #[test]
    fn test_failed_reload_keeps_previous_watch_set() {
        let mut fx = fixture(&["a"]);
        *fx.fail.lock() = true;
        *fx.next.lock() = Some(vec![fx.root.join("c")]);

        fx.daemon.reload_configuration();

        let watched = fx.daemon.watched_directories();
        assert!(watched.contains(&fx.root.join("a")));
        assert!(!watched.contains(&fx.root.join("c")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queued_write_survives_swap_for_unchanged_directory() {
        let mut fx = fixture(&["a", "b"]);
        *fx.next.lock() = Some(vec![fx.root.join("b"), fx.root.join("c")]);

        let kept = fx.root.join("b").join("kept.txt");
        let dropped = fx.root.join("a").join("gone.txt");
        fs::write(&kept, "x").unwrap();
        fs::write(&dropped, "x").unwrap();

        // Let notify queue both writes on the current set without draining it
        tokio::time::sleep(Duration::from_millis(300)).await;
        fx.daemon.reload_configuration();

        assert!(fx.daemon.registry().is_pending(&kept));
        assert!(!fx.daemon.registry().is_pending(&dropped));
    }

    #[tokio::test]
    async fn test_config_event_for_other_file_is_ignored() {
        let mut fx = fixture(&["a"]);
        *fx.next.lock() = Some(vec![fx.root.join("c")]);

        let other = fx.root.join("cfg").join("unrelated.toml");
        fx.daemon.handle_config_event(write_event(&other));
        assert!(fx.daemon.watched_directories().contains(&fx.root.join("a")));

        let config = fx.root.join("cfg").join("config.toml");
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(config);
        fx.daemon.handle_config_event(create);
        assert!(fx.daemon.watched_directories().contains(&fx.root.join("c")));
        assert!(!fx.daemon.watched_directories().contains(&fx.root.join("a")));
    }

    #[tokio::test]
    async fn test_watch_event_filters_before_debounce() {
        let mut fx = fixture(&["a"]);
        let file = fx.root.join("a").join("doc.txt");
        let swap = fx.root.join("a").join(".doc.txt.swp");
        fs::write(&file, "x").unwrap();

        fx.daemon.handle_watch_event(write_event(&file));
        fx.daemon.handle_watch_event(write_event(&swap));
        fx.daemon.handle_watch_event(write_event(&fx.root.join("a").join("sub")));
        fx.daemon.handle_watch_event(
            Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone()),
        );

        assert_eq!(fx.daemon.registry().pending_count(), 1);
        assert!(fx.daemon.registry().is_pending(&file));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_abandons_pending() {
        let mut fx = fixture(&["a"]);
        let file = fx.root.join("a").join("late.txt");
        fs::write(&file, "x").unwrap();
        fx.daemon.handle_watch_event(write_event(&file));

        let uploader = fx.uploader.clone();
        fx.daemon.run(async {}).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(uploader.paths.lock().is_empty());
    }

    #[tokio::test]
    async fn test_run_flushes_pending_when_configured() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("w");
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("flush.txt");
        fs::write(&file, "x").unwrap();

        let uploader = Arc::new(CountingUploader::default());
        let mut daemon = Daemon::builder()
            .source(ScriptedSource {
                path: temp.path().join("config.toml"),
                dirs: Arc::new(Mutex::new(vec![dir.clone()])),
                next: Arc::new(Mutex::new(None)),
                fail: Arc::new(Mutex::new(false)),
            })
            .uploader(uploader.clone())
            .quiet_period(Duration::from_secs(60))
            .shutdown_policy(ShutdownPolicy::Flush)
            .build()
            .unwrap();

        daemon.handle_watch_event(write_event(&file));
        daemon.run(async {}).await;

        assert_eq!(*uploader.paths.lock(), vec![file]);
    }
}

//! Change event model and pre-debounce filtering.

use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::ModifyKind;

/// Suffixes of editor backup and swap files that never trigger an upload.
const IGNORED_SUFFIXES: &[&str] = &["~", ".swp"];

/// Kind of a filesystem change, reduced to what the daemon acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File content was written.
    Write,
    /// Entry was created.
    Create,
    /// Entry was removed.
    Remove,
    /// Entry was renamed or moved.
    Rename,
    /// Permissions, timestamps or other metadata changed.
    Metadata,
    /// Anything else (access events, backend-specific kinds).
    Other,
}

impl From<&EventKind> for ChangeKind {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => ChangeKind::Create,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => ChangeKind::Write,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
            EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::Metadata,
            EventKind::Remove(_) => ChangeKind::Remove,
            _ => ChangeKind::Other,
        }
    }
}

/// A single-path change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Split a notify event into one change event per affected path.
    pub fn from_notify(event: notify::Event) -> Vec<ChangeEvent> {
        let kind = ChangeKind::from(&event.kind);
        event
            .paths
            .into_iter()
            .map(|path| ChangeEvent { path, kind })
            .collect()
    }

    /// True for create-or-write, the kinds that signal new config content.
    pub fn is_write_or_create(&self) -> bool {
        matches!(self.kind, ChangeKind::Write | ChangeKind::Create)
    }
}

/// Why an event was dropped before reaching the debounce registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotWrite,
    BackupFile,
    Directory,
}

/// Decide whether a watch-set event should be debounced into an upload.
///
/// Only content writes to regular files qualify. Editor backup/swap files and
/// directories (which raise write-like events when their entries change) are
/// dropped.
pub fn check_upload_candidate(event: &ChangeEvent) -> Result<(), Rejection> {
    if event.kind != ChangeKind::Write {
        return Err(Rejection::NotWrite);
    }
    if is_backup_file(&event.path) {
        return Err(Rejection::BackupFile);
    }
    if event.path.is_dir() {
        return Err(Rejection::Directory);
    }
    Ok(())
}

/// Check for editor backup and swap file suffixes.
pub fn is_backup_file(path: &Path) -> bool {
    let name = path.as_os_str().to_string_lossy();
    IGNORED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

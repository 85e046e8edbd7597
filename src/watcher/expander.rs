//! Expansion of watch roots into the full set of directories to watch.
//!
//! Each directory is watched non-recursively, so every nested level has to be
//! enumerated up front. Files are never part of the result; they are covered
//! through their parent directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Expand watch roots into every directory reachable beneath them.
///
/// Roots that cannot be resolved, do not exist, or are not directories are
/// skipped with a warning. Walk errors inside a root (permission denied,
/// entries vanishing mid-walk) skip only the offending entry.
pub fn expand<P: AsRef<Path>>(roots: &[P]) -> BTreeSet<PathBuf> {
    let mut dirs = BTreeSet::new();

    for root in roots {
        let root = root.as_ref();
        let Some(resolved) = resolve_root(root) else {
            continue;
        };

        let before = dirs.len();
        walk_directories(&resolved, &mut dirs);
        crate::debug_event!(
            "expander",
            "expanded",
            "{} -> {} directories",
            resolved.display(),
            dirs.len() - before
        );
    }

    dirs
}

/// Resolve a root to an absolute, existing directory.
fn resolve_root(root: &Path) -> Option<PathBuf> {
    let absolute = match std::path::absolute(root) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("[expander] cannot resolve {}: {e}", root.display());
            return None;
        }
    };

    match std::fs::metadata(&absolute) {
        Ok(meta) if meta.is_dir() => Some(absolute),
        Ok(_) => {
            tracing::warn!(
                "[expander] skipping {}: not a directory",
                absolute.display()
            );
            None
        }
        Err(e) => {
            tracing::warn!("[expander] skipping {}: {e}", absolute.display());
            None
        }
    }
}

fn walk_directories(root: &Path, dirs: &mut BTreeSet<PathBuf>) {
    let walker = WalkDir::new(root).follow_links(false);

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_dir() {
                    dirs.insert(entry.into_path());
                }
            }
            Err(e) => {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| root.display().to_string());
                tracing::warn!("[expander] skipping {path}: {e}");
            }
        }
    }
}

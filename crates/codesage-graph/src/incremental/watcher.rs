//! Filesystem watcher feeding the change tracker.

use super::change::{ChangeTracker, ChangeType};
use crate::config::UpdaterConfig;
use crate::error::{GraphError, Result};
use log::{debug, error, info, warn};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Decides which paths under a watched root are source files worth
/// syncing.
#[derive(Debug, Clone)]
pub struct PathFilter {
    extensions: Vec<String>,
    ignored_dirs: Vec<String>,
}

impl PathFilter {
    /// Filter from the updater's extension allow-list and directory
    /// deny-list.
    pub fn new(config: &UpdaterConfig) -> Self {
        Self {
            extensions: config
                .watched_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            ignored_dirs: config.ignored_dirs.clone(),
        }
    }

    /// True when `path` has a watched extension and no hidden or ignored
    /// component below `root`.
    ///
    /// Components of `root` itself are not checked, so a project checked
    /// out under a hidden directory is still watched.
    pub fn accepts(&self, path: &Path, root: &Path) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let ext = format!(".{}", ext.to_string_lossy().to_ascii_lowercase());
        if !self.extensions.contains(&ext) {
            return false;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        relative.components().all(|component| match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                !part.starts_with('.') && !self.ignored_dirs.iter().any(|d| *d == part)
            }
            _ => true,
        })
    }
}

/// Map a notify event to the change it means for each of its paths.
fn classify(event: &Event) -> Vec<(PathBuf, ChangeType)> {
    let change_for = |path: &PathBuf| -> Option<ChangeType> {
        match event.kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => None,
            EventKind::Create(_) if path.is_dir() => None,
            EventKind::Create(_) => Some(ChangeType::Create),
            // a rename is a create at the new path and a delete at the old one
            EventKind::Modify(ModifyKind::Name(_)) => Some(if path.exists() {
                ChangeType::Create
            } else {
                ChangeType::Delete
            }),
            EventKind::Modify(ModifyKind::Metadata(_)) => None,
            EventKind::Modify(_) if path.is_dir() => None,
            EventKind::Modify(_) => Some(ChangeType::Modify),
            EventKind::Remove(_) => Some(ChangeType::Delete),
            _ => None,
        }
    };
    event
        .paths
        .iter()
        .filter_map(|path| change_for(path).map(|change| (path.clone(), change)))
        .collect()
}

/// Recursive OS watcher over one or more roots.
///
/// Events are filtered and handed to the [`ChangeTracker`] on the watcher's
/// own thread. Dropping the watcher stops it.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    /// Start watching `paths` recursively.
    ///
    /// Paths that do not exist are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`GraphError::Watcher`] when the OS watcher cannot be created or a
    /// root cannot be registered.
    pub fn start(paths: &[PathBuf], filter: PathFilter, tracker: Arc<ChangeTracker>) -> Result<Self> {
        let roots: Vec<PathBuf> = paths
            .iter()
            .filter(|p| {
                let exists = p.exists();
                if !exists {
                    warn!("Watch path does not exist: {}", p.display());
                }
                exists
            })
            .cloned()
            .collect();

        let handler_roots = roots.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for (path, change) in classify(&event) {
                    let root = handler_roots
                        .iter()
                        .find(|r| path.starts_with(r))
                        .map(PathBuf::as_path)
                        .unwrap_or_else(|| Path::new(""));
                    if filter.accepts(&path, root) {
                        debug!("File system event: {change} {}", path.display());
                        tracker.record(path, change);
                    }
                }
            }
            Err(e) => error!("File system watch error: {e}"),
        })
        .map_err(|e| GraphError::Watcher {
            message: format!("Failed to create watcher: {e}"),
        })?;

        for root in &roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| GraphError::Watcher {
                    message: format!("Failed to watch {}: {e}", root.display()),
                })?;
            info!("Watching path: {}", root.display());
        }

        Ok(Self { watcher, roots })
    }

    /// Roots being watched.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Stop watching every root.
    pub fn stop(mut self) {
        for root in &self.roots {
            if let Err(e) = self.watcher.unwatch(root) {
                debug!("Failed to unwatch {}: {e}", root.display());
            }
        }
        info!("File system watcher stopped");
    }
}

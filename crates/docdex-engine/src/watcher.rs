//! File system watcher feeding the build controller.
//!
//! Uses FSEvents on macOS and inotify on Linux for efficient file system
//! event monitoring with debouncing at the notifier level; scheduling-level
//! coalescing is the controller's job.

use crate::controller::BuildController;
use crate::router::ExcludeSet;
use crate::EngineError;
use docdex_core::normalize_rel_path;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// File change type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// File was created
    Created,
    /// File was modified
    Modified,
    /// File was deleted
    Deleted,
}

/// A file system change event.
#[derive(Debug, Clone)]
pub struct FileChange {
    /// Path to the changed file
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
}

/// Events yielded by the watcher.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A relevant file changed
    Change(FileChange),
    /// Watch registration finished; the initial scan is complete
    Ready,
}

/// Decides which filesystem events are relevant to the engine:
/// excluded paths are dropped, as is any file whose extension is neither
/// native nor plugin-claimed.
pub struct WatchFilter {
    root: PathBuf,
    excludes: Arc<ExcludeSet>,
    /// Lowercased extensions worth rebuilding for
    extensions: Vec<String>,
}

impl WatchFilter {
    /// Create a filter over watched extensions.
    pub fn new(root: PathBuf, excludes: Arc<ExcludeSet>, extensions: Vec<String>) -> Self {
        Self {
            root,
            excludes,
            extensions: extensions.into_iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Whether an event for this path should reach the controller.
    pub fn accepts(&self, path: &Path) -> bool {
        let rel = normalize_rel_path(&self.root, path);
        if self.excludes.is_excluded(&rel) {
            return false;
        }
        match path.extension() {
            Some(ext) => {
                let ext = ext.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|e| *e == ext)
            }
            None => false,
        }
    }
}

/// Options for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Debounce duration at the notifier level
    pub debounce_duration: Duration,
    /// Whether to watch recursively
    pub recursive: bool,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
            recursive: true,
        }
    }
}

/// File system watcher with debouncing and engine-side filtering.
pub struct FileWatcher {
    options: WatcherOptions,
    tx: mpsc::Sender<WatchEvent>,
    rx: mpsc::Receiver<WatchEvent>,
    _debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl FileWatcher {
    /// Create a new file watcher.
    pub fn new(options: WatcherOptions) -> Self {
        let (tx, rx) = mpsc::channel(1000);
        Self {
            options,
            tx,
            rx,
            _debouncer: None,
        }
    }

    /// Start watching a directory, filtering events through `filter`.
    ///
    /// Emits `WatchEvent::Ready` once registration completes.
    pub fn watch(&mut self, path: &Path, filter: WatchFilter) -> Result<(), EngineError> {
        let path = path
            .canonicalize()
            .map_err(|e| EngineError::Watcher(format!("{}: {}", path.display(), e)))?;

        let tx = self.tx.clone();

        let mut debouncer = new_debouncer(
            self.options.debounce_duration,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(change) = convert_event(&event.event) {
                            if !filter.accepts(&change.path) {
                                continue;
                            }
                            if let Err(e) = tx.blocking_send(WatchEvent::Change(change)) {
                                error!(error = %e, "Failed to send change event");
                            }
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "Watcher error");
                    }
                }
            },
        )
        .map_err(|e| EngineError::Watcher(e.to_string()))?;

        let mode = if self.options.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        debouncer
            .watch(&path, mode)
            .map_err(|e: notify::Error| EngineError::Watcher(e.to_string()))?;

        info!(path = ?path, recursive = self.options.recursive, "Started watching");

        self._debouncer = Some(debouncer);

        // Registration done: the initial scan is over.
        let _ = self.tx.try_send(WatchEvent::Ready);

        Ok(())
    }

    /// Receive the next event.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }

    /// Try to receive an event without blocking.
    pub fn try_next(&mut self) -> Option<WatchEvent> {
        self.rx.try_recv().ok()
    }

    /// Check if there are pending events.
    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }
}

/// Convert a notify Event to our FileChange.
fn convert_event(event: &Event) -> Option<FileChange> {
    let path = event.paths.first()?.clone();

    // Only care about files, not directories
    if path.is_dir() {
        return None;
    }

    let kind = match &event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Any => return None,
        EventKind::Access(_) => return None, // Ignore access events
        EventKind::Other => return None,
    };

    debug!(path = ?path, kind = ?kind, "File change detected");

    Some(FileChange { path, kind })
}

/// Pumps watcher events into the build controller.
pub struct WatchSession {
    watcher: FileWatcher,
    controller: Arc<BuildController>,
}

impl WatchSession {
    /// Create a session from a started watcher and a controller.
    pub fn new(watcher: FileWatcher, controller: Arc<BuildController>) -> Self {
        Self {
            watcher,
            controller,
        }
    }

    /// Consume events until the watcher channel closes, scheduling a build
    /// for every relevant change.
    pub async fn run(mut self) {
        while let Some(event) = self.watcher.next().await {
            match event {
                WatchEvent::Ready => {
                    info!("Initial scan complete, watching for changes");
                }
                WatchEvent::Change(change) => {
                    debug!(path = ?change.path, kind = ?change.kind, "Scheduling build");
                    self.controller.schedule();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn filter_for(root: &Path, exts: &[&str]) -> WatchFilter {
        WatchFilter::new(
            root.to_path_buf(),
            Arc::new(ExcludeSet::new(&[]).unwrap()),
            exts.iter().map(|e| e.to_string()).collect(),
        )
    }

    #[test]
    fn test_watcher_options_default() {
        let options = WatcherOptions::default();
        assert_eq!(options.debounce_duration, Duration::from_millis(500));
        assert!(options.recursive);
    }

    #[tokio::test]
    async fn test_watcher_create_and_ready() {
        let temp_dir = tempdir().unwrap();
        let mut watcher = FileWatcher::new(WatcherOptions::default());

        watcher
            .watch(temp_dir.path(), filter_for(temp_dir.path(), &["ts"]))
            .unwrap();

        match watcher.try_next() {
            Some(WatchEvent::Ready) => {}
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_accepts_watched_extension() {
        let temp_dir = tempdir().unwrap();
        let filter = filter_for(temp_dir.path(), &["ts", "vue"]);

        assert!(filter.accepts(&temp_dir.path().join("src/a.ts")));
        assert!(filter.accepts(&temp_dir.path().join("src/W.VUE")));
        assert!(!filter.accepts(&temp_dir.path().join("src/a.py")));
        assert!(!filter.accepts(&temp_dir.path().join("Makefile")));
    }

    #[test]
    fn test_filter_rejects_excluded_paths() {
        let temp_dir = tempdir().unwrap();
        let filter = filter_for(temp_dir.path(), &["ts"]);

        assert!(!filter.accepts(&temp_dir.path().join("node_modules/dep/index.ts")));
        assert!(!filter.accepts(&temp_dir.path().join(".docdex/index.json")));
    }

    #[test]
    fn test_convert_event_create() {
        let event = Event {
            kind: EventKind::Create(notify::event::CreateKind::File),
            paths: vec![PathBuf::from("test.ts")],
            attrs: Default::default(),
        };

        let change = convert_event(&event);
        assert!(change.is_some());
        assert_eq!(change.unwrap().kind, ChangeKind::Created);
    }

    #[test]
    fn test_convert_event_modify() {
        let event = Event {
            kind: EventKind::Modify(notify::event::ModifyKind::Data(
                notify::event::DataChange::Content,
            )),
            paths: vec![PathBuf::from("test.ts")],
            attrs: Default::default(),
        };

        let change = convert_event(&event);
        assert!(change.is_some());
        assert_eq!(change.unwrap().kind, ChangeKind::Modified);
    }

    #[test]
    fn test_convert_event_delete() {
        let event = Event {
            kind: EventKind::Remove(notify::event::RemoveKind::File),
            paths: vec![PathBuf::from("test.ts")],
            attrs: Default::default(),
        };

        let change = convert_event(&event);
        assert!(change.is_some());
        assert_eq!(change.unwrap().kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_convert_event_access_ignored() {
        let event = Event {
            kind: EventKind::Access(notify::event::AccessKind::Read),
            paths: vec![PathBuf::from("test.ts")],
            attrs: Default::default(),
        };

        let change = convert_event(&event);
        assert!(change.is_none());
    }
}

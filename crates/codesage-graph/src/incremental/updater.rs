//! Background synchronization of stored graphs with files on disk.

use super::change::{ChangeTracker, ChangeType, EventOutcome};
use super::watcher::{FileWatcher, PathFilter};
use crate::builder::GraphBuilder;
use crate::config::UpdaterConfig;
use crate::error::{GraphError, Result};
use crate::model::{create_node_id, Graph, GraphDelta, Node, NodeType};
use crate::storage::{StorageAdapter, StorageExt};
use codesage_parser_api::ParserRegistry;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Counters reported by [`IncrementalUpdater::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdaterStats {
    /// Changes processed successfully
    pub changes_processed: u64,
    /// Processed changes that produced a non-empty delta
    pub deltas_applied: u64,
    /// Failed changes plus events dropped on a full queue
    pub errors: u64,
    /// Mean wall time per processed change
    pub avg_processing_time_ms: f64,
    /// Changes waiting in the queue
    pub queue_size: usize,
    /// Paths inside their debounce window
    pub pending_changes: usize,
    /// Whether the consumer thread is running
    pub is_running: bool,
    /// Whether a filesystem watcher is active
    pub is_watching: bool,
}

struct Shared {
    storage: Arc<dyn StorageAdapter>,
    parsers: ParserRegistry,
    tracker: Arc<ChangeTracker>,
    config: UpdaterConfig,
    running: AtomicBool,
    processed: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
    processing_micros: AtomicU64,
}

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

/// Keeps a stored graph in step with source files.
///
/// Changes arrive from a filesystem watcher or from
/// [`IncrementalUpdater::on_file_changed`], are debounced per path, and are
/// applied by one consumer thread. Each change becomes a [`GraphDelta`]
/// between the file's stored subgraph and a fresh parse, applied in one
/// transaction.
///
/// Nodes shared between files (modules and builtin or external call
/// placeholders) are never deleted by a change to one file.
pub struct IncrementalUpdater {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
    watcher: Mutex<Option<FileWatcher>>,
}

impl IncrementalUpdater {
    /// Updater writing to `storage`, parsing with `parsers`.
    pub fn new(storage: Arc<dyn StorageAdapter>, parsers: ParserRegistry, config: UpdaterConfig) -> Self {
        let tracker = Arc::new(ChangeTracker::new(config.debounce_interval, config.max_queue_size));
        Self {
            shared: Arc::new(Shared {
                storage,
                parsers,
                tracker,
                config,
                running: AtomicBool::new(false),
                processed: AtomicU64::new(0),
                applied: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                processing_micros: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// Start the consumer thread and, when `paths` is non-empty, a
    /// recursive watcher over them.
    ///
    /// # Errors
    ///
    /// [`GraphError::InvalidOperation`] if already running;
    /// [`GraphError::Watcher`] if the watcher cannot start, in which case
    /// the consumer is stopped again.
    pub fn start(&self, paths: &[PathBuf]) -> Result<()> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GraphError::invalid_operation("Incremental updater is already running"));
        }

        let (done_tx, done_rx) = bounded(1);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("codesage-updater".to_string())
            .spawn(move || consume(shared, done_tx))
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                GraphError::Io(e)
            })?;
        *self.worker.lock() = Some(Worker { handle, done: done_rx });

        if !paths.is_empty() {
            let filter = PathFilter::new(&self.shared.config);
            match FileWatcher::start(paths, filter, Arc::clone(&self.shared.tracker)) {
                Ok(watcher) => *self.watcher.lock() = Some(watcher),
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }

        info!("Incremental updater started ({} watch paths)", paths.len());
        Ok(())
    }

    /// Stop the watcher and the consumer thread.
    ///
    /// Waits up to the configured stop timeout for the consumer; a consumer
    /// that does not finish in time is detached. Calling `stop` on a stopped
    /// updater does nothing.
    pub fn stop(&self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.stop();
        }

        let was_running = self.shared.running.swap(false, Ordering::AcqRel);
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        match worker.done.recv_timeout(self.shared.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    warn!("Incremental updater thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Incremental updater did not stop within {:?}, detaching",
                    self.shared.config.stop_timeout
                );
            }
        }
        if was_running {
            info!("Incremental updater stopped");
        }
    }

    /// Whether the consumer thread is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Record a change without a watcher.
    ///
    /// Subject to the same debouncing as watcher events. A dropped event
    /// counts as an error.
    pub fn on_file_changed(&self, path: impl Into<PathBuf>, change_type: ChangeType) -> EventOutcome {
        self.shared.tracker.record(path.into(), change_type)
    }

    /// Process `path` now, bypassing the queue.
    ///
    /// The change type is inferred: modify if the file exists, delete
    /// otherwise.
    pub fn force_update(&self, path: &Path) -> Result<GraphDelta> {
        let change_type = if path.exists() {
            ChangeType::Modify
        } else {
            ChangeType::Delete
        };
        self.process_change(path, change_type)
    }

    /// Compute and apply the delta for one change, synchronously.
    pub fn process_change(&self, path: &Path, change_type: ChangeType) -> Result<GraphDelta> {
        self.shared.process(path, change_type)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> UpdaterStats {
        let shared = &self.shared;
        let processed = shared.processed.load(Ordering::Relaxed);
        let micros = shared.processing_micros.load(Ordering::Relaxed);
        UpdaterStats {
            changes_processed: processed,
            deltas_applied: shared.applied.load(Ordering::Relaxed),
            errors: shared.failed.load(Ordering::Relaxed) + shared.tracker.dropped(),
            avg_processing_time_ms: if processed == 0 {
                0.0
            } else {
                micros as f64 / processed as f64 / 1000.0
            },
            queue_size: shared.tracker.queue_len(),
            pending_changes: shared.tracker.pending_len(),
            is_running: self.is_running(),
            is_watching: self.watcher.lock().is_some(),
        }
    }
}

impl Drop for IncrementalUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}

fn consume(shared: Arc<Shared>, done: Sender<()>) {
    debug!("Updater consumer loop started");
    let poll = shared.config.poll_interval;
    let requeue_delay = shared.config.requeue_delay;

    while shared.running.load(Ordering::Acquire) {
        let Some(change) = shared.tracker.next_ready(poll, requeue_delay) else {
            continue;
        };
        if let Err(e) = shared.process(&change.path, change.change_type) {
            error!("Failed to process {change}: {e}");
        }
    }

    debug!("Updater consumer loop finished");
    // stop() may already have given up waiting
    let _ = done.send(());
}

impl Shared {
    fn process(&self, path: &Path, change_type: ChangeType) -> Result<GraphDelta> {
        let started = Instant::now();
        let result = self.sync_file(path, change_type);
        let elapsed = started.elapsed().as_micros() as u64;

        match &result {
            Ok(delta) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
                self.processing_micros.fetch_add(elapsed, Ordering::Relaxed);
                if !delta.is_empty() {
                    self.applied.fetch_add(1, Ordering::Relaxed);
                    info!("Applied delta for {}: {delta}", path.display());
                } else {
                    debug!("No graph changes for {}", path.display());
                }
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    fn sync_file(&self, path: &Path, change_type: ChangeType) -> Result<GraphDelta> {
        let file_path = path.to_string_lossy().into_owned();
        let previous = self.stored_fragment(&file_path)?;

        let mut delta = match change_type {
            ChangeType::Delete => GraphDelta::removing(&previous),
            ChangeType::Create | ChangeType::Modify => {
                let mut parsed = self.parsers.parse_file(path)?;
                parsed.file_path = file_path.clone();
                let current = GraphBuilder::new().from_parsed_file(&parsed);
                GraphDelta::between(&previous, &current)
            }
        };
        delta
            .deleted_nodes
            .retain(|id| previous.get_node(id).is_some_and(|n| owned_by(n, &file_path)));

        if !delta.is_empty() {
            self.storage.as_ref().transaction(|s| delta.apply_to_storage(s))?;
        }
        Ok(delta)
    }

    /// The file's stored subgraph: the file node, every node the file
    /// owns, their outgoing edges, and the edge targets as context.
    fn stored_fragment(&self, file_path: &str) -> Result<Graph> {
        let mut graph = Graph::new();
        let file_id = create_node_id(NodeType::File, file_path, None);
        match self.storage.get_node(&file_id) {
            Ok(node) => graph.add_node(node),
            Err(e) if e.is_not_found() => return Ok(graph),
            Err(e) => return Err(e),
        }

        let mut worklist = vec![file_id];
        while let Some(id) = worklist.pop() {
            for edge in self.storage.get_edges(&id, None, None)? {
                if !graph.has_node(&edge.target) {
                    let target = match self.storage.get_node(&edge.target) {
                        Ok(node) => node,
                        Err(e) if e.is_not_found() => {
                            debug!("Stored edge {} points at a missing node", edge.key());
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    if owned_by(&target, file_path) {
                        worklist.push(target.id.clone());
                    }
                    graph.add_node(target);
                }
                graph.add_edge(edge)?;
            }
        }
        Ok(graph)
    }
}

/// True for the file node itself and nodes whose id is scoped by the path.
fn owned_by(node: &Node, file_path: &str) -> bool {
    let node_type = node.node_type();
    if node_type == NodeType::File {
        return node.qualified_name() == file_path;
    }
    node.id == create_node_id(node_type, node.qualified_name(), Some(file_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use codesage_parser_api::JsonRecordParser;
    use std::fs;
    use std::time::Duration;

    fn updater() -> (IncrementalUpdater, Arc<dyn StorageAdapter>) {
        let storage: Arc<dyn StorageAdapter> = Arc::new(SqliteStorage::in_memory().unwrap());
        let parsers = ParserRegistry::new().with_parser(Box::new(JsonRecordParser::new("python", vec![".py"])));
        let config = UpdaterConfig::default()
            .with_debounce(Duration::from_millis(10))
            .with_poll_interval(Duration::from_millis(10))
            .with_requeue_delay(Duration::ZERO);
        (IncrementalUpdater::new(Arc::clone(&storage), parsers, config), storage)
    }

    const TWO_FUNCTIONS: &str = r#"{
        "functions": [
            {"name": "a", "line_start": 1, "line_end": 3, "calls": [{"name": "print"}]},
            {"name": "b", "line_start": 5, "line_end": 9}
        ],
        "imports": [{"module": "os"}]
    }"#;

    #[test]
    fn test_create_modify_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.py");
        let file_path = path.to_string_lossy().into_owned();
        let (updater, storage) = updater();

        fs::write(&path, TWO_FUNCTIONS).unwrap();
        let created = updater.process_change(&path, ChangeType::Create).unwrap();
        assert!(!created.added_nodes.is_empty());
        let b_id = create_node_id(NodeType::Function, "b", Some(&file_path));
        assert!(storage.node_exists(&b_id).unwrap());

        fs::write(&path, r#"{"functions": [{"name": "a", "line_start": 1, "line_end": 3}]}"#).unwrap();
        let modified = updater.force_update(&path).unwrap();
        assert!(modified.deleted_nodes.contains(&b_id));
        assert!(!storage.node_exists(&b_id).unwrap());
        // shared nodes survive even though this file no longer references them
        assert!(storage.node_exists("function:builtin.print").unwrap());
        assert!(storage.node_exists("module:os").unwrap());

        fs::remove_file(&path).unwrap();
        updater.force_update(&path).unwrap();
        let file_id = create_node_id(NodeType::File, &file_path, None);
        assert!(!storage.node_exists(&file_id).unwrap());
        assert!(storage.node_exists("module:os").unwrap());

        let stats = updater.stats();
        assert_eq!(stats.changes_processed, 3);
        assert_eq!(stats.deltas_applied, 3);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_unchanged_file_yields_empty_delta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.py");
        let (updater, _) = updater();

        fs::write(&path, TWO_FUNCTIONS).unwrap();
        updater.process_change(&path, ChangeType::Create).unwrap();
        let again = updater.process_change(&path, ChangeType::Modify).unwrap();
        assert!(again.is_empty(), "unexpected delta: {again}");
        assert_eq!(updater.stats().deltas_applied, 1);
    }

    #[test]
    fn test_parse_failure_counts_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.py");
        let (updater, _) = updater();

        fs::write(&path, "def broken(:").unwrap();
        let err = updater.process_change(&path, ChangeType::Create).unwrap_err();
        assert!(matches!(err, GraphError::Parser(_)));
        assert_eq!(updater.stats().errors, 1);
        assert_eq!(updater.stats().changes_processed, 0);
    }

    #[test]
    fn test_delete_of_unknown_file_is_noop() {
        let (updater, _) = updater();
        let delta = updater
            .process_change(Path::new("/nowhere/ghost.py"), ChangeType::Delete)
            .unwrap();
        assert!(delta.is_empty());
    }

    #[test]
    fn test_start_twice_fails_and_stop_is_idempotent() {
        let (updater, _) = updater();
        updater.start(&[]).unwrap();
        assert!(updater.is_running());
        assert!(matches!(updater.start(&[]), Err(GraphError::InvalidOperation { .. })));

        updater.stop();
        updater.stop();
        assert!(!updater.is_running());
        assert!(!updater.stats().is_watching);
    }

    #[test]
    fn test_consumer_applies_queued_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queued.py");
        fs::write(&path, TWO_FUNCTIONS).unwrap();
        let (updater, storage) = updater();

        updater.start(&[]).unwrap();
        assert_eq!(updater.on_file_changed(&path, ChangeType::Create), EventOutcome::Queued);

        let file_id = create_node_id(NodeType::File, &path.to_string_lossy(), None);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !storage.node_exists(&file_id).unwrap() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        updater.stop();
        assert!(storage.node_exists(&file_id).unwrap());
    }
}

//! File change events and the debounced change queue.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// File appeared
    Create,
    /// File contents changed
    Modify,
    /// File disappeared
    Delete,
}

impl ChangeType {
    /// Combine two changes seen on one path within the debounce window.
    ///
    /// A delete anywhere in the window wins; any other combination is a
    /// modification.
    pub fn merge(self, later: ChangeType) -> ChangeType {
        if self == ChangeType::Delete || later == ChangeType::Delete {
            ChangeType::Delete
        } else {
            ChangeType::Modify
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Create => "create",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
        })
    }
}

/// A change queued for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path as reported by the watcher
    pub path: PathBuf,
    /// What happened
    pub change_type: ChangeType,
}

impl fmt::Display for FileChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.change_type, self.path.display())
    }
}

/// What [`ChangeTracker::record`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The path was idle; a change was queued
    Queued,
    /// The path already had a change inside the window; it absorbed this one
    Merged,
    /// The queue was full; the event was discarded
    Dropped,
}

/// Debounce map plus a bounded queue of pending changes.
///
/// The map holds `path -> (last event time, merged change type)`. The lock
/// only covers the merge/enqueue decision; sending on the channel and every
/// wait happen outside it.
pub struct ChangeTracker {
    pending: Mutex<HashMap<PathBuf, (Instant, ChangeType)>>,
    sender: Sender<FileChange>,
    receiver: Receiver<FileChange>,
    debounce: Duration,
    dropped: AtomicU64,
}

impl ChangeTracker {
    /// Tracker with the given debounce window and queue capacity.
    pub fn new(debounce: Duration, capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            pending: Mutex::new(HashMap::new()),
            sender,
            receiver,
            debounce,
            dropped: AtomicU64::new(0),
        }
    }

    /// Record a filesystem event.
    pub fn record(&self, path: PathBuf, change_type: ChangeType) -> EventOutcome {
        let now = Instant::now();
        {
            let mut pending = self.pending.lock();
            if let Some((last_seen, merged)) = pending.get_mut(&path) {
                if now.duration_since(*last_seen) < self.debounce {
                    *merged = merged.merge(change_type);
                    *last_seen = now;
                    return EventOutcome::Merged;
                }
            }
            pending.insert(path.clone(), (now, change_type));
        }

        let change = FileChange {
            path: path.clone(),
            change_type,
        };
        match self.sender.try_send(change) {
            Ok(()) => {
                debug!("Queued change: {change_type} {}", path.display());
                EventOutcome::Queued
            }
            Err(TrySendError::Full(change) | TrySendError::Disconnected(change)) => {
                self.pending.lock().remove(&change.path);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Change queue full, dropping {change}");
                EventOutcome::Dropped
            }
        }
    }

    /// Wait up to `poll` for the next change whose window has closed.
    ///
    /// A change whose path was touched again inside the window goes back on
    /// the queue and the call returns `None` after `requeue_delay`. A ready
    /// change carries the type merged over its whole window.
    pub fn next_ready(&self, poll: Duration, requeue_delay: Duration) -> Option<FileChange> {
        let change = match self.receiver.recv_timeout(poll) {
            Ok(change) => change,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
        };

        let merged = {
            let mut pending = self.pending.lock();
            match pending.get(&change.path) {
                Some((last_seen, _)) if last_seen.elapsed() < self.debounce => None,
                Some(_) => pending.remove(&change.path).map(|(_, merged)| merged),
                None => Some(change.change_type),
            }
        };

        match merged {
            Some(change_type) => Some(FileChange {
                path: change.path,
                change_type,
            }),
            None => {
                if let Err(e) = self.sender.try_send(change) {
                    let change = e.into_inner();
                    self.pending.lock().remove(&change.path);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("Change queue full, dropping requeued {change}");
                }
                thread::sleep(requeue_delay);
                None
            }
        }
    }

    /// Merged change type pending for `path`, if any.
    pub fn pending_change(&self, path: &Path) -> Option<ChangeType> {
        self.pending.lock().get(path).map(|(_, change_type)| *change_type)
    }

    /// Paths inside their debounce window or waiting in the queue.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Changes currently queued.
    pub fn queue_len(&self) -> usize {
        self.receiver.len()
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The debounce window.
    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

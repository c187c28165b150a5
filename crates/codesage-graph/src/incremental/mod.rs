//! Incremental graph updates driven by filesystem changes.
//!
//! ```text
//! notify watcher ─▶ PathFilter ─▶ ChangeTracker (debounce + bounded queue)
//!                                        │
//!                                        ▼
//!                     consumer thread: parse ─▶ GraphDelta ─▶ storage
//! ```

pub mod change;
pub mod updater;
pub mod watcher;

pub use change::{ChangeTracker, ChangeType, EventOutcome, FileChange};
pub use updater::{IncrementalUpdater, UpdaterStats};
pub use watcher::{FileWatcher, PathFilter};

//! # codesage-graph
//!
//! A queryable graph of a codebase's structure, kept in sync with the files
//! on disk.
//!
//! ## Architecture
//!
//! ```text
//! Parser output (ParsedFile records)
//!     ↓
//! GraphBuilder (per-file graph fragments)
//!     ↓
//! StorageAdapter (SQLite, key-value over memory or RocksDB)
//!     ↑                         ↑
//! QueryProcessor (DSL)     IncrementalUpdater (watch → delta → storage)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use codesage_graph::{GraphBuilder, QueryProcessor, SqliteStorage, StorageAdapter, SaveOptions};
//! use codesage_parser_api::{CallRecord, FunctionRecord, ParsedFile};
//!
//! let mut parsed = ParsedFile::new("app.py", "python");
//! parsed.add_function(FunctionRecord::new("main", 1, 10).with_complexity(12));
//! parsed.add_function(
//!     FunctionRecord::new("helper", 12, 20).with_call(CallRecord::new("main")),
//! );
//!
//! let graph = GraphBuilder::new().from_parsed_file(&parsed);
//! let storage = SqliteStorage::in_memory().unwrap();
//! storage.save_graph(&graph, &SaveOptions::default()).unwrap();
//!
//! let processor = QueryProcessor::new(&storage);
//! let result = processor.execute("FIND function WHERE complexity > 10").unwrap();
//! assert_eq!(result.nodes.len(), 1);
//! assert_eq!(result.nodes[0].name(), "main");
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod config;
pub mod error;
pub mod incremental;
pub mod model;
pub mod query;
pub mod storage;

// Re-export main types
pub use builder::{CallTarget, GraphBuilder, PLACEHOLDER_PROPERTY};
pub use config::{KeyValueConfig, RelationalConfig, UpdaterConfig};
pub use error::{GraphError, Result};
pub use incremental::{ChangeType, IncrementalUpdater, UpdaterStats};
pub use model::{
    create_node_id, Direction, Edge, EdgeKind, EdgeSelector, EdgeType, Graph, GraphDelta, Node,
    NodeKind, NodeType, PropertyMap, PropertyValue,
};
pub use query::{parse_query, GraphSchema, Query, QueryProcessor, QueryResult};
#[cfg(feature = "rocksdb-backend")]
pub use storage::RocksDbStore;
pub use storage::{
    Expiry, KeyValueStorage, MemoryStore, NodeFilter, SaveOptions, SqliteStorage, StorageAdapter,
    StorageExt, StorageStatistics,
};

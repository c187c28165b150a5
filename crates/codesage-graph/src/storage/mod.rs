//! Storage adapter contract and implementations.
//!
//! [`StorageAdapter`] is the one interface the query processor and the
//! incremental updater talk to. Two implementations ship with the crate:
//! - [`SqliteStorage`]: relational, native transactions, recursive CTE loads
//! - [`KeyValueStorage`]: keyed blobs over a [`KeyValueStore`]
//!   ([`MemoryStore`] for tests, [`RocksDbStore`] on disk)
//!
//! ## Transactions
//!
//! Use [`StorageExt::transaction`]: it commits when the closure returns
//! `Ok`, rolls back on `Err` or panic, and reports failures as
//! [`GraphError::Storage`]. A transaction opened inside another joins it.

pub mod filter;
pub mod kv;
pub mod relational;

pub use filter::{Condition, FilterOp, NodeFilter};
#[cfg(feature = "rocksdb-backend")]
pub use kv::RocksDbStore;
pub use kv::{BatchOperation, KeyValue, KeyValueStorage, KeyValueStore, MemoryStore};
pub use relational::SqliteStorage;

use crate::error::{GraphError, Result};
use crate::model::{Edge, EdgeType, Graph, Node, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Chunk size for bulk saves when none is configured.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Expiry policy for a save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Expiry {
    /// Use the backend's configured default
    #[default]
    Default,
    /// Never expire
    Never,
    /// Expire after the given duration
    After(Duration),
}

/// Options for [`StorageAdapter::save_graph`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Key expiry; ignored by backends without expiry
    pub expiry: Expiry,
    /// Override of the backend's bulk chunk size
    pub batch_size: Option<usize>,
}

impl SaveOptions {
    /// Expire written keys after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expiry = Expiry::After(ttl);
        self
    }

    /// Keep written keys forever.
    pub fn without_expiry(mut self) -> Self {
        self.expiry = Expiry::Never;
        self
    }

    /// Set the bulk chunk size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }
}

/// Totals and per-type counts of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStatistics {
    /// Backend name
    pub backend: String,
    /// Number of nodes
    pub node_count: usize,
    /// Number of edges
    pub edge_count: usize,
    /// Node count per node type
    pub nodes_by_type: BTreeMap<String, usize>,
    /// Edge count per edge type
    pub edges_by_type: BTreeMap<String, usize>,
}

/// Persistence contract for code graphs.
///
/// Implementations serialize concurrent callers onto their backend's own
/// concurrency model; every method takes `&self`.
pub trait StorageAdapter: Send + Sync {
    /// Persist every node and edge of `graph`.
    fn save_graph(&self, graph: &Graph, options: &SaveOptions) -> Result<()>;

    /// Load the subgraph reachable from `root_id` over outgoing edges, up to
    /// `max_depth` hops.
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`] when the root does not exist.
    fn load_graph(&self, root_id: &str, max_depth: usize) -> Result<Graph>;

    /// Nodes of a type (or of every type) matching `filter`, ordered by id,
    /// paginated after filtering.
    fn query_nodes(
        &self,
        node_type: Option<NodeType>,
        filter: &NodeFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Node>>;

    /// Insert or replace a node.
    fn save_node(&self, node: &Node) -> Result<()>;

    /// Insert an edge.
    fn save_edge(&self, edge: &Edge) -> Result<()>;

    /// Remove a node and its edges. Removing a missing node is not an error.
    fn delete_node(&self, node_id: &str) -> Result<()>;

    /// Remove the edges from `source` to `target`, of one type or all types.
    fn delete_edge(&self, source: &str, target: &str, edge_type: Option<EdgeType>) -> Result<()>;

    /// Fetch a node.
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`] when the node does not exist.
    fn get_node(&self, node_id: &str) -> Result<Node>;

    /// Outgoing edges of `source`, optionally narrowed by target and type.
    fn get_edges(&self, source: &str, target: Option<&str>, edge_type: Option<EdgeType>) -> Result<Vec<Edge>>;

    /// Incoming edges of `target`, optionally narrowed by type.
    fn get_incoming_edges(&self, target: &str, edge_type: Option<EdgeType>) -> Result<Vec<Edge>>;

    /// Whether a node exists.
    fn node_exists(&self, node_id: &str) -> Result<bool>;

    /// Number of nodes, of one type or in total.
    fn node_count(&self, node_type: Option<NodeType>) -> Result<usize>;

    /// Number of edges, of one type or in total.
    fn edge_count(&self, edge_type: Option<EdgeType>) -> Result<usize>;

    /// Remove everything this adapter stored.
    fn clear_all(&self) -> Result<()>;

    /// Totals and per-type counts.
    fn statistics(&self) -> Result<StorageStatistics>;

    /// Run `body` inside one transaction.
    ///
    /// Object-safe primitive behind [`StorageExt::transaction`]; prefer that.
    fn run_in_transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()>;

    /// Save nodes in chunks of `batch_size`, one transaction per chunk.
    ///
    /// Chunks committed before a failure stay committed. Returns the number
    /// of nodes saved.
    fn bulk_save_nodes(&self, nodes: &[Node], batch_size: usize) -> Result<usize> {
        let mut saved = 0;
        for chunk in nodes.chunks(batch_size.max(1)) {
            self.run_in_transaction(&mut || {
                for node in chunk {
                    self.save_node(node)?;
                }
                Ok(())
            })?;
            saved += chunk.len();
        }
        Ok(saved)
    }

    /// Save edges in chunks of `batch_size`, one transaction per chunk.
    fn bulk_save_edges(&self, edges: &[Edge], batch_size: usize) -> Result<usize> {
        let mut saved = 0;
        for chunk in edges.chunks(batch_size.max(1)) {
            self.run_in_transaction(&mut || {
                for edge in chunk {
                    self.save_edge(edge)?;
                }
                Ok(())
            })?;
            saved += chunk.len();
        }
        Ok(saved)
    }
}

/// Scoped transactions over any [`StorageAdapter`].
pub trait StorageExt: StorageAdapter {
    /// Run `f` inside a transaction and return its value.
    ///
    /// ```
    /// use codesage_graph::{SqliteStorage, StorageAdapter, StorageExt};
    ///
    /// let storage = SqliteStorage::in_memory().unwrap();
    /// let count = storage.transaction(|s| s.node_count(None)).unwrap();
    /// assert_eq!(count, 0);
    /// ```
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>;
}

impl<S: StorageAdapter + ?Sized> StorageExt for S {
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        let mut body = Some(f);
        let mut output = None;
        self.run_in_transaction(&mut || {
            let f = body
                .take()
                .ok_or_else(|| GraphError::invalid_operation("transaction body invoked twice"))?;
            output = Some(f(self)?);
            Ok(())
        })?;
        output.ok_or_else(|| GraphError::invalid_operation("transaction body was not invoked"))
    }
}

//! Graph layout over a [`KeyValueStore`].
//!
//! Key layout (`<p>` is the configured prefix):
//!
//! | key | value |
//! |-----|-------|
//! | `<p>:node:<id>` | msgpack node record |
//! | `<p>:type:<type>:<id>` | empty (type index) |
//! | `<p>:edges:<source>:<target>:<type>` | msgpack edge record |
//! | `<p>:incoming:<target>:<source>:<type>` | msgpack edge record (reverse index) |
//! | `<p>:edge_type:<type>:<source>:<target>` | empty (edge-type index) |
//!
//! Ids contain `:` themselves, so prefix scans over edges can pick up a
//! longer id that shares the prefix; every scan re-checks the decoded
//! record's endpoints.
//!
//! Every value starts with an 8-byte big-endian expiry timestamp in
//! milliseconds since the epoch (`0` = never). Expired entries read as
//! absent and are overwritten or removed by later writes.

use super::{BatchOperation, KeyValueStore, MemoryStore};
use crate::config::KeyValueConfig;
use crate::error::{GraphError, Result};
use crate::model::{Edge, EdgeType, Graph, Node, NodeType};
use crate::storage::{Expiry, NodeFilter, SaveOptions, StorageAdapter, StorageStatistics};
use log::{debug, trace};
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(feature = "rocksdb-backend")]
use super::RocksDbStore;

const ENVELOPE_LEN: usize = 8;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn seal(expires_at: u64, payload: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(ENVELOPE_LEN + payload.len());
    value.extend_from_slice(&expires_at.to_be_bytes());
    value.extend_from_slice(payload);
    value
}

/// Payload of a live value, `None` when expired or malformed.
fn unseal(value: &[u8], now: u64) -> Option<&[u8]> {
    if value.len() < ENVELOPE_LEN {
        return None;
    }
    let (head, payload) = value.split_at(ENVELOPE_LEN);
    let expires_at = u64::from_be_bytes(head.try_into().ok()?);
    if expires_at != 0 && expires_at <= now {
        return None;
    }
    Some(payload)
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| GraphError::serialization("Failed to encode record", Some(e)))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| GraphError::serialization("Failed to decode record", Some(e)))
}

struct KeyLayout {
    prefix: String,
}

impl KeyLayout {
    fn key(&self, parts: &[&str]) -> Vec<u8> {
        let mut key = self.prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key.into_bytes()
    }

    /// Same as [`KeyLayout::key`] with a trailing separator, for scans.
    fn scan(&self, parts: &[&str]) -> Vec<u8> {
        let mut key = self.key(parts);
        key.push(b':');
        key
    }

    fn node(&self, id: &str) -> Vec<u8> {
        self.key(&["node", id])
    }

    fn type_index(&self, node_type: NodeType, id: &str) -> Vec<u8> {
        self.key(&["type", node_type.as_str(), id])
    }

    fn edge(&self, source: &str, target: &str, edge_type: EdgeType) -> Vec<u8> {
        self.key(&["edges", source, target, edge_type.as_str()])
    }

    fn incoming(&self, target: &str, source: &str, edge_type: EdgeType) -> Vec<u8> {
        self.key(&["incoming", target, source, edge_type.as_str()])
    }

    fn edge_type_index(&self, edge_type: EdgeType, source: &str, target: &str) -> Vec<u8> {
        self.key(&["edge_type", edge_type.as_str(), source, target])
    }
}

#[derive(Default)]
struct PendingWrites {
    depth: usize,
    operations: Vec<BatchOperation>,
}

/// Leaves a transaction scope on every exit path; an outer scope that was
/// not committed discards its buffered writes.
struct TxScope<'a> {
    pending: &'a RefCell<PendingWrites>,
    outer: bool,
}

impl<'a> TxScope<'a> {
    fn enter(pending: &'a RefCell<PendingWrites>) -> Self {
        let mut state = pending.borrow_mut();
        state.depth += 1;
        Self {
            outer: state.depth == 1,
            pending,
        }
    }

    fn take_operations(&self) -> Vec<BatchOperation> {
        std::mem::take(&mut self.pending.borrow_mut().operations)
    }
}

impl Drop for TxScope<'_> {
    fn drop(&mut self) {
        let mut state = self.pending.borrow_mut();
        state.depth -= 1;
        if self.outer {
            state.operations.clear();
        }
    }
}

/// [`StorageAdapter`] over any [`KeyValueStore`].
///
/// Deleting a node removes its record, its type index entry and its
/// outgoing edges. Edges that only point *at* the node survive unless
/// [`KeyValueConfig::cascade_incoming`] is set, because the store has no
/// foreign keys to cascade along.
pub struct KeyValueStorage<S: KeyValueStore> {
    store: RwLock<S>,
    keys: KeyLayout,
    config: KeyValueConfig,
    pending: ReentrantMutex<RefCell<PendingWrites>>,
}

impl KeyValueStorage<MemoryStore> {
    /// Adapter over a fresh [`MemoryStore`] with the default config.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new(), KeyValueConfig::default())
    }
}

#[cfg(feature = "rocksdb-backend")]
impl KeyValueStorage<RocksDbStore> {
    /// Open a RocksDB store at `config.path`.
    ///
    /// # Errors
    /// [`GraphError::Storage`] when the database cannot be opened.
    pub fn open(config: KeyValueConfig) -> Result<Self> {
        let store = RocksDbStore::open(&config.path)?;
        Ok(Self::new(store, config))
    }
}

impl<S: KeyValueStore> KeyValueStorage<S> {
    /// Adapter over an existing store.
    pub fn new(store: S, config: KeyValueConfig) -> Self {
        Self {
            store: RwLock::new(store),
            keys: KeyLayout {
                prefix: config.key_prefix.clone(),
            },
            config,
            pending: ReentrantMutex::new(RefCell::new(PendingWrites::default())),
        }
    }

    /// The adapter's configuration.
    pub fn config(&self) -> &KeyValueConfig {
        &self.config
    }

    /// Flush the underlying store.
    pub fn flush(&self) -> Result<()> {
        self.store.write().flush()
    }

    fn expires_at(&self, expiry: Expiry) -> u64 {
        let ttl = match expiry {
            Expiry::Default => self.config.default_ttl,
            Expiry::Never => None,
            Expiry::After(ttl) => Some(ttl),
        };
        ttl.map_or(0, |ttl| now_millis().saturating_add(ttl.as_millis() as u64))
    }

    /// Write now, or buffer when this thread is inside a transaction.
    fn submit(&self, operations: Vec<BatchOperation>) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }
        let guard = self.pending.lock();
        {
            let mut state = guard.borrow_mut();
            if state.depth > 0 {
                trace!("Buffering {} operations", operations.len());
                state.operations.extend(operations);
                return Ok(());
            }
        }
        self.store.write().write_batch(operations)
    }

    fn read_live(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let raw = self.store.read().get(key)?;
        Ok(raw.and_then(|value| unseal(&value, now_millis()).map(<[u8]>::to_vec)))
    }

    fn scan_live(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let now = now_millis();
        let pairs = self.store.read().scan_prefix(prefix)?;
        Ok(pairs
            .into_iter()
            .filter_map(|(key, value)| unseal(&value, now).map(|payload| (key, payload.to_vec())))
            .collect())
    }

    fn read_node(&self, node_id: &str) -> Result<Option<Node>> {
        self.read_live(&self.keys.node(node_id))?
            .map(|bytes| decode::<Node>(&bytes))
            .transpose()
    }

    fn scan_edges(&self, prefix: &[u8]) -> Result<Vec<Edge>> {
        self.scan_live(prefix)?
            .into_iter()
            .map(|(_, payload)| decode::<Edge>(&payload))
            .collect()
    }

    fn outgoing(&self, source: &str, target: Option<&str>) -> Result<Vec<Edge>> {
        let prefix = match target {
            Some(target) => self.keys.scan(&["edges", source, target]),
            None => self.keys.scan(&["edges", source]),
        };
        let mut edges = self.scan_edges(&prefix)?;
        edges.retain(|e| e.source == source && target.map_or(true, |t| e.target == t));
        Ok(edges)
    }

    fn incoming(&self, target: &str) -> Result<Vec<Edge>> {
        let mut edges = self.scan_edges(&self.keys.scan(&["incoming", target]))?;
        edges.retain(|e| e.target == target);
        Ok(edges)
    }

    fn push_node(&self, node: &Node, expires_at: u64, ops: &mut Vec<BatchOperation>) -> Result<()> {
        ops.push(BatchOperation::Put {
            key: self.keys.node(&node.id),
            value: seal(expires_at, &encode(node)?),
        });
        ops.push(BatchOperation::Put {
            key: self.keys.type_index(node.node_type(), &node.id),
            value: seal(expires_at, &[]),
        });
        Ok(())
    }

    fn push_edge(&self, edge: &Edge, expires_at: u64, ops: &mut Vec<BatchOperation>) -> Result<()> {
        let record = seal(expires_at, &encode(edge)?);
        let edge_type = edge.edge_type();
        ops.push(BatchOperation::Put {
            key: self.keys.edge(&edge.source, &edge.target, edge_type),
            value: record.clone(),
        });
        ops.push(BatchOperation::Put {
            key: self.keys.incoming(&edge.target, &edge.source, edge_type),
            value: record,
        });
        ops.push(BatchOperation::Put {
            key: self.keys.edge_type_index(edge_type, &edge.source, &edge.target),
            value: seal(expires_at, &[]),
        });
        Ok(())
    }

    fn push_edge_delete(&self, source: &str, target: &str, edge_type: EdgeType, ops: &mut Vec<BatchOperation>) {
        ops.push(BatchOperation::Delete {
            key: self.keys.edge(source, target, edge_type),
        });
        ops.push(BatchOperation::Delete {
            key: self.keys.incoming(target, source, edge_type),
        });
        ops.push(BatchOperation::Delete {
            key: self.keys.edge_type_index(edge_type, source, target),
        });
    }

    fn count_live(&self, prefix: &[u8]) -> Result<usize> {
        Ok(self.scan_live(prefix)?.len())
    }
}

impl<S: KeyValueStore> StorageAdapter for KeyValueStorage<S> {
    fn save_graph(&self, graph: &Graph, options: &SaveOptions) -> Result<()> {
        let expires_at = self.expires_at(options.expiry);
        let mut ops = Vec::with_capacity(graph.node_count() * 2 + graph.edge_count() * 3);
        for node in graph.nodes() {
            self.push_node(node, expires_at, &mut ops)?;
        }
        for edge in graph.edges() {
            self.push_edge(edge, expires_at, &mut ops)?;
        }
        debug!(
            "Saving graph with {} nodes and {} edges as one batch",
            graph.node_count(),
            graph.edge_count()
        );
        self.submit(ops)
    }

    fn load_graph(&self, root_id: &str, max_depth: usize) -> Result<Graph> {
        let root = self
            .read_node(root_id)?
            .ok_or_else(|| GraphError::node_not_found(root_id))?;

        let mut graph = Graph::new();
        let mut visited: HashSet<String> = HashSet::from([root_id.to_string()]);
        let mut queue = VecDeque::from([(root_id.to_string(), 0usize)]);
        let mut deferred = Vec::new();
        graph.add_node(root);

        while let Some((node_id, depth)) = queue.pop_front() {
            if node_id != root_id {
                match self.read_node(&node_id)? {
                    Some(node) => graph.add_node(node),
                    None => continue,
                }
            }

            for edge in self.outgoing(&node_id, None)? {
                if depth < max_depth && visited.insert(edge.target.clone()) {
                    queue.push_back((edge.target.clone(), depth + 1));
                }
                deferred.push(edge);
            }
        }

        // edges past the depth bound or into missing nodes are dropped
        for edge in deferred {
            if graph.has_node(&edge.source) && graph.has_node(&edge.target) {
                graph.add_edge(edge)?;
            }
        }
        Ok(graph)
    }

    fn query_nodes(
        &self,
        node_type: Option<NodeType>,
        filter: &NodeFilter,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Node>> {
        let types: Vec<NodeType> = match node_type {
            Some(t) => vec![t],
            None => NodeType::ALL.to_vec(),
        };

        let mut ids = Vec::new();
        for t in types {
            let prefix = self.keys.scan(&["type", t.as_str()]);
            for (key, _) in self.scan_live(&prefix)? {
                if let Ok(id) = String::from_utf8(key[prefix.len()..].to_vec()) {
                    ids.push(id);
                }
            }
        }
        ids.sort();

        let keys: Vec<Vec<u8>> = ids.iter().map(|id| self.keys.node(id)).collect();
        let values = self.store.read().multi_get(&keys)?;
        let now = now_millis();

        let mut matched = Vec::new();
        for value in values.into_iter().flatten() {
            let Some(payload) = unseal(&value, now) else {
                continue;
            };
            let node: Node = decode(payload)?;
            if filter.matches(&node) {
                matched.push(node);
            }
        }

        Ok(matched
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn save_node(&self, node: &Node) -> Result<()> {
        let mut ops = Vec::with_capacity(2);
        self.push_node(node, self.expires_at(Expiry::Default), &mut ops)?;
        self.submit(ops)
    }

    fn save_edge(&self, edge: &Edge) -> Result<()> {
        let mut ops = Vec::with_capacity(3);
        self.push_edge(edge, self.expires_at(Expiry::Default), &mut ops)?;
        self.submit(ops)
    }

    fn delete_node(&self, node_id: &str) -> Result<()> {
        let mut ops = vec![BatchOperation::Delete {
            key: self.keys.node(node_id),
        }];
        for node_type in NodeType::ALL {
            ops.push(BatchOperation::Delete {
                key: self.keys.type_index(node_type, node_id),
            });
        }
        for edge in self.outgoing(node_id, None)? {
            self.push_edge_delete(&edge.source, &edge.target, edge.edge_type(), &mut ops);
        }
        if self.config.cascade_incoming {
            for edge in self.incoming(node_id)? {
                self.push_edge_delete(&edge.source, &edge.target, edge.edge_type(), &mut ops);
            }
        }
        self.submit(ops)
    }

    fn delete_edge(&self, source: &str, target: &str, edge_type: Option<EdgeType>) -> Result<()> {
        let mut ops = Vec::new();
        match edge_type {
            Some(edge_type) => self.push_edge_delete(source, target, edge_type, &mut ops),
            None => {
                for edge in self.outgoing(source, Some(target))? {
                    self.push_edge_delete(source, target, edge.edge_type(), &mut ops);
                }
            }
        }
        self.submit(ops)
    }

    fn get_node(&self, node_id: &str) -> Result<Node> {
        self.read_node(node_id)?
            .ok_or_else(|| GraphError::node_not_found(node_id))
    }

    fn get_edges(&self, source: &str, target: Option<&str>, edge_type: Option<EdgeType>) -> Result<Vec<Edge>> {
        let mut edges = self.outgoing(source, target)?;
        if let Some(edge_type) = edge_type {
            edges.retain(|e| e.edge_type() == edge_type);
        }
        Ok(edges)
    }

    fn get_incoming_edges(&self, target: &str, edge_type: Option<EdgeType>) -> Result<Vec<Edge>> {
        let mut edges = self.incoming(target)?;
        if let Some(edge_type) = edge_type {
            edges.retain(|e| e.edge_type() == edge_type);
        }
        Ok(edges)
    }

    fn node_exists(&self, node_id: &str) -> Result<bool> {
        Ok(self.read_live(&self.keys.node(node_id))?.is_some())
    }

    fn node_count(&self, node_type: Option<NodeType>) -> Result<usize> {
        match node_type {
            Some(t) => self.count_live(&self.keys.scan(&["type", t.as_str()])),
            None => self.count_live(&self.keys.scan(&["node"])),
        }
    }

    fn edge_count(&self, edge_type: Option<EdgeType>) -> Result<usize> {
        match edge_type {
            Some(t) => self.count_live(&self.keys.scan(&["edge_type", t.as_str()])),
            None => self.count_live(&self.keys.scan(&["edges"])),
        }
    }

    fn clear_all(&self) -> Result<()> {
        let mut prefix = self.keys.prefix.clone().into_bytes();
        prefix.push(b':');
        let keys = self.store.read().scan_prefix(&prefix)?;
        debug!("Clearing {} keys under {}", keys.len(), self.keys.prefix);
        self.submit(
            keys.into_iter()
                .map(|(key, _)| BatchOperation::Delete { key })
                .collect(),
        )
    }

    fn statistics(&self) -> Result<StorageStatistics> {
        let mut stats = StorageStatistics {
            backend: "key-value".to_string(),
            node_count: self.node_count(None)?,
            edge_count: self.edge_count(None)?,
            ..Default::default()
        };
        for node_type in NodeType::ALL {
            let count = self.node_count(Some(node_type))?;
            if count > 0 {
                stats.nodes_by_type.insert(node_type.to_string(), count);
            }
        }
        for edge_type in EdgeType::ALL {
            let count = self.edge_count(Some(edge_type))?;
            if count > 0 {
                stats.edges_by_type.insert(edge_type.to_string(), count);
            }
        }
        Ok(stats)
    }

    fn run_in_transaction(&self, body: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let guard = self.pending.lock();
        let scope = TxScope::enter(&guard);
        let result = body();

        if !scope.outer {
            return result;
        }
        match result {
            Ok(()) => {
                let operations = scope.take_operations();
                trace!("Committing {} buffered operations", operations.len());
                if operations.is_empty() {
                    return Ok(());
                }
                self.store
                    .write()
                    .write_batch(operations)
                    .map_err(GraphError::into_transaction_failure)
            }
            Err(e) => {
                debug!("Discarding buffered writes: {e}");
                Err(e.into_transaction_failure())
            }
        }
    }
}

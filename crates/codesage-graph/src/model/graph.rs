//! The in-memory graph aggregate.

use super::edge::{Edge, EdgeKey};
use super::node::Node;
use super::types::{EdgeType, NodeType};
use crate::error::{GraphError, Result};
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Direction for adjacency queries and traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Follow edges from source to target
    Outgoing,
    /// Follow edges from target to source
    Incoming,
}

/// Nodes, edges, and forward/reverse adjacency indices.
///
/// Invariant: every edge's source and target exist as nodes in the same
/// graph. [`Graph::add_edge`] enforces it and [`Graph::remove_node`]
/// cascades to every touching edge.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    edges: HashMap<EdgeKey, Edge>,
    outgoing: HashMap<String, HashSet<EdgeKey>>,
    incoming: HashMap<String, HashSet<EdgeKey>>,
}

/// Serialized shape shared by the JSON and msgpack encodings.
#[derive(Serialize, Deserialize)]
struct GraphDocument {
    nodes: BTreeMap<String, Node>,
    edges: Vec<Edge>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Node Operations
    // ========================================

    /// Insert a node, replacing any node with the same id wholesale.
    ///
    /// Edges touching the id are kept.
    pub fn add_node(&mut self, node: Node) {
        trace!("add_node {}", node.id);
        self.nodes.insert(node.id.clone(), node);
    }

    /// Get a node by id.
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Check whether a node exists.
    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Remove a node and every edge that touches it.
    ///
    /// Returns the removed node, or `None` if it was not present.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.remove(id)?;

        let mut touching: Vec<EdgeKey> = Vec::new();
        if let Some(keys) = self.outgoing.remove(id) {
            touching.extend(keys);
        }
        if let Some(keys) = self.incoming.remove(id) {
            touching.extend(keys);
        }
        for key in touching {
            self.unlink_edge(&key);
        }

        trace!("remove_node {id}");
        Some(node)
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Ids of all nodes.
    pub fn node_ids(&self) -> HashSet<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Nodes of one type.
    pub fn nodes_of_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.node_type() == node_type)
            .collect()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================
    // Edge Operations
    // ========================================

    /// Insert an edge.
    ///
    /// Re-adding an edge with the same `(source, target, type)` replaces its
    /// properties.
    ///
    /// # Errors
    /// [`GraphError::InvalidEdge`] when either endpoint is not in the graph.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(GraphError::InvalidEdge {
                source_id: edge.source.clone(),
                target_id: edge.target.clone(),
                reason: "source node not in graph".to_string(),
            });
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(GraphError::InvalidEdge {
                source_id: edge.source.clone(),
                target_id: edge.target.clone(),
                reason: "target node not in graph".to_string(),
            });
        }

        let key = edge.key();
        self.outgoing
            .entry(edge.source.clone())
            .or_default()
            .insert(key.clone());
        self.incoming
            .entry(edge.target.clone())
            .or_default()
            .insert(key.clone());
        self.edges.insert(key, edge);
        Ok(())
    }

    /// Remove one edge by identity.
    pub fn remove_edge(&mut self, key: &EdgeKey) -> Option<Edge> {
        self.unlink_edge(key)
    }

    /// Remove every edge between `source` and `target`, of any type.
    pub fn remove_edges_between(&mut self, source: &str, target: &str) -> usize {
        let keys: Vec<EdgeKey> = self
            .outgoing
            .get(source)
            .map(|keys| keys.iter().filter(|k| k.target == target).cloned().collect())
            .unwrap_or_default();
        keys.iter().filter(|k| self.remove_edge(k).is_some()).count()
    }

    fn unlink_edge(&mut self, key: &EdgeKey) -> Option<Edge> {
        let edge = self.edges.remove(key)?;
        if let Some(keys) = self.outgoing.get_mut(&key.source) {
            keys.remove(key);
        }
        if let Some(keys) = self.incoming.get_mut(&key.target) {
            keys.remove(key);
        }
        Some(edge)
    }

    /// Get an edge by identity.
    pub fn get_edge(&self, key: &EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    /// Check whether an edge exists.
    pub fn has_edge(&self, key: &EdgeKey) -> bool {
        self.edges.contains_key(key)
    }

    /// Outgoing edges of `source`, optionally narrowed by target and type.
    pub fn get_edges(&self, source: &str, target: Option<&str>, edge_type: Option<EdgeType>) -> Vec<&Edge> {
        self.adjacent(source, Direction::Outgoing)
            .filter(|e| target.map_or(true, |t| e.target == t))
            .filter(|e| edge_type.map_or(true, |t| e.edge_type() == t))
            .collect()
    }

    /// Incoming edges of `target`, optionally narrowed by type.
    pub fn get_incoming_edges(&self, target: &str, edge_type: Option<EdgeType>) -> Vec<&Edge> {
        self.adjacent(target, Direction::Incoming)
            .filter(|e| edge_type.map_or(true, |t| e.edge_type() == t))
            .collect()
    }

    /// Edges adjacent to a node in one direction.
    pub fn adjacent(&self, id: &str, direction: Direction) -> impl Iterator<Item = &Edge> {
        let index = match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        };
        index
            .get(id)
            .into_iter()
            .flat_map(|keys| keys.iter())
            .filter_map(|key| self.edges.get(key))
    }

    /// Neighbor ids of a node in one direction, optionally by edge type.
    pub fn neighbors(&self, id: &str, direction: Direction, edge_types: Option<&[EdgeType]>) -> Vec<&str> {
        self.adjacent(id, direction)
            .filter(|e| edge_types.map_or(true, |types| types.contains(&e.edge_type())))
            .map(|e| match direction {
                Direction::Outgoing => e.target.as_str(),
                Direction::Incoming => e.source.as_str(),
            })
            .collect()
    }

    /// Node ids reachable from `start` over outgoing edges, breadth first,
    /// starting with `start`.
    ///
    /// # Errors
    /// [`GraphError::NodeNotFound`] when `start` is not in the graph.
    pub fn traverse_bfs(&self, start: &str, max_depth: Option<usize>, edge_types: Option<&[EdgeType]>) -> Result<Vec<String>> {
        super::algorithms::bfs(self, start, Direction::Outgoing, max_depth, edge_types)
    }

    /// Depth-first counterpart of [`Graph::traverse_bfs`].
    pub fn traverse_dfs(&self, start: &str, max_depth: Option<usize>, edge_types: Option<&[EdgeType]>) -> Result<Vec<String>> {
        super::algorithms::dfs(self, start, Direction::Outgoing, max_depth, edge_types)
    }

    /// Iterate over all edges.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Identities of all edges.
    pub fn edge_keys(&self) -> HashSet<EdgeKey> {
        self.edges.keys().cloned().collect()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Merge another graph into this one; nodes and edge properties from
    /// `other` win on collision.
    pub fn merge(&mut self, other: &Graph) -> Result<()> {
        for node in other.nodes() {
            self.add_node(node.clone());
        }
        for edge in other.edges() {
            self.add_edge(edge.clone())?;
        }
        Ok(())
    }

    // ========================================
    // Serialization
    // ========================================

    fn to_document(&self) -> GraphDocument {
        let mut edges: Vec<Edge> = self.edges.values().cloned().collect();
        edges.sort_by_key(|e| e.key());
        GraphDocument {
            nodes: self
                .nodes
                .iter()
                .map(|(id, node)| (id.clone(), node.clone()))
                .collect(),
            edges,
        }
    }

    fn from_document(doc: GraphDocument) -> Result<Self> {
        let mut graph = Graph::new();
        for (_, node) in doc.nodes {
            graph.add_node(node);
        }
        for edge in doc.edges {
            graph.add_edge(edge)?;
        }
        Ok(graph)
    }

    /// Encode as `{"nodes": {id: node}, "edges": [edge]}`.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.to_document())
            .map_err(|e| GraphError::serialization("Failed to encode graph as JSON", Some(e)))
    }

    /// Decode from the JSON encoding.
    ///
    /// # Errors
    /// [`GraphError::Serialization`] for malformed input and
    /// [`GraphError::InvalidEdge`] for an edge whose endpoint is missing.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: GraphDocument = serde_json::from_str(json)
            .map_err(|e| GraphError::serialization("Failed to decode graph JSON", Some(e)))?;
        Self::from_document(doc)
    }

    /// Encode as msgpack (maps with named fields).
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(&self.to_document())
            .map_err(|e| GraphError::serialization("Failed to encode graph as msgpack", Some(e)))
    }

    /// Decode from the msgpack encoding.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        let doc: GraphDocument = rmp_serde::from_slice(bytes)
            .map_err(|e| GraphError::serialization("Failed to decode graph msgpack", Some(e)))?;
        Self::from_document(doc)
    }
}
